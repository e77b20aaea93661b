//! Prompt builders for single-chunk and batched reviews.
//!
//! The prompts are language-agnostic and include, per file:
//! - path, language, addition/deletion counts,
//! - an "Available Imports" block (or an explicit none note),
//! - the code context with absolute line numbers and an arrow on the target,
//! - the diff block itself.
//!
//! Output format is strict for reliable downstream parsing.

use crate::diff::DiffChunk;

/// Fixed system prompt shared by both review shapes.
pub const SYSTEM_PROMPT: &str = "\
You are a senior code reviewer.
Review ONLY the lines carrying a '+' or '-' prefix in the diff; surrounding lines are context.
The 'Available Imports' section enumerates imports that exist in the file. Trust it and check it before flagging a missing import.
The 'Code Context' section shows real file content. Check it before flagging an undefined identifier.
Prioritize findings: security > logic > performance > best-practice > style.
Respond with EXACTLY ONE JSON object and nothing else: {\"summary\": string, \"issues\": [{\"line\": number, \"severity\": \"critical\"|\"high\"|\"medium\"|\"low\", \"type\": \"security\"|\"performance\"|\"logic\"|\"style\", \"message\": string, \"suggestion\": string}]}.
Do not wrap the JSON in code fences or prose.";

/// Builds the user prompt for one chunk.
pub fn build_single_prompt(chunk: &DiffChunk) -> String {
    let mut s = String::new();
    push_chunk_sections(&mut s, chunk);
    s.push_str(
        "\nReturn one JSON object with `summary` and `issues` as instructed. \
         `line` values are absolute new-file line numbers.\n",
    );
    s
}

/// Builds the user prompt for a batched review over several chunks.
///
/// Every issue in a batched response must carry a `file` field so findings
/// can be routed back to their chunk.
pub fn build_batched_prompt(chunks: &[DiffChunk]) -> String {
    let mut s = String::new();
    s.push_str(&format!(
        "Review the following {} changed files together.\n\n",
        chunks.len()
    ));

    for (i, chunk) in chunks.iter().enumerate() {
        s.push_str(&format!("## File {}/{}\n\n", i + 1, chunks.len()));
        push_chunk_sections(&mut s, chunk);
        s.push('\n');
    }

    s.push_str(
        "Return ONE JSON document covering all files. Every issue MUST include a \
         `file` field holding the exact file path it belongs to, alongside `line`, \
         `severity`, `type`, `message`, and `suggestion`.\n",
    );
    s
}

/// Shared per-file sections: header, imports, context, diff.
fn push_chunk_sections(s: &mut String, chunk: &DiffChunk) {
    s.push_str(&format!("File: {}\n", chunk.filename));
    s.push_str(&format!("Language: {}\n", chunk.language));
    s.push_str(&format!(
        "Changes: +{} -{}\n\n",
        chunk.additions, chunk.deletions
    ));

    match &chunk.file_context {
        Some(ctx) if !ctx.imports.is_empty() => {
            s.push_str("### Available Imports\n```\n");
            for import in &ctx.imports {
                s.push_str(&sanitize_fence(import));
                s.push('\n');
            }
            s.push_str("```\n\n");
        }
        _ => {
            s.push_str("### Available Imports\n(no imports found in this file)\n\n");
        }
    }

    if let Some(ctx) = &chunk.file_context {
        s.push_str("### Code Context\n```\n");
        for (offset, line) in ctx.lines.iter().enumerate() {
            let number = ctx.start_line + offset as u32;
            let marker = if number == ctx.target_line { "->" } else { "  " };
            s.push_str(&format!("{number:>5} {marker}| {}\n", sanitize_fence(line)));
        }
        s.push_str("```\n\n");
    }

    s.push_str("### Diff\n```diff\n");
    s.push_str(&sanitize_fence(&chunk.hunk_text));
    s.push_str("\n```\n");
}

/// Avoids accidental code-fence termination inside model-rendered text.
fn sanitize_fence(x: &str) -> String {
    x.replace("```", "``\u{200B}`")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::build_file_context;

    fn chunk_with_context() -> DiffChunk {
        let content = "import { cache } from './cache';\n\
                       \n\
                       export function compute(n: number) {\n\
                       \x20 return cache.get(n) ?? n * 2;\n\
                       }\n";
        DiffChunk {
            filename: "src/utils.ts".into(),
            old_path: "src/utils.ts".into(),
            language: "typescript",
            hunk_text: "+  return cache.get(n) ?? n * 2;".into(),
            additions: 1,
            deletions: 0,
            changed_lines: vec![4],
            file_context: Some(build_file_context(content, "typescript", 4, 10)),
        }
    }

    #[test]
    fn single_prompt_carries_all_sections() {
        let prompt = build_single_prompt(&chunk_with_context());
        assert!(prompt.contains("File: src/utils.ts"));
        assert!(prompt.contains("Language: typescript"));
        assert!(prompt.contains("Changes: +1 -0"));
        assert!(prompt.contains("### Available Imports"));
        assert!(prompt.contains("import { cache } from './cache';"));
        assert!(prompt.contains("### Code Context"));
        assert!(prompt.contains("### Diff"));
        // Arrow sits on the target line.
        assert!(prompt.contains("    4 ->|"));
    }

    #[test]
    fn missing_imports_get_an_explicit_note() {
        let mut chunk = chunk_with_context();
        chunk.file_context = None;
        let prompt = build_single_prompt(&chunk);
        assert!(prompt.contains("(no imports found in this file)"));
    }

    #[test]
    fn batched_prompt_numbers_files_and_demands_file_field() {
        let chunks = vec![chunk_with_context(), chunk_with_context()];
        let prompt = build_batched_prompt(&chunks);
        assert!(prompt.contains("## File 1/2"));
        assert!(prompt.contains("## File 2/2"));
        assert!(prompt.contains("`file` field"));
    }
}
