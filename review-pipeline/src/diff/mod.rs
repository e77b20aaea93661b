//! Diff processor: unified-diff parsing and chunk assembly.
//!
//! A *chunk* is one hunk's changed lines plus up to `context_lines` unchanged
//! lines around each addition, rendered with their original `+`/`-`/space
//! prefixes. Binary and deleted files are skipped; a chunk with no changes is
//! dropped; chunk text is capped at [`MAX_CHUNK_LINES`] lines.

use std::collections::BTreeSet;

use tracing::warn;

use crate::context::FileContext;
use crate::forge::types::FileDiff;

/// Context radius used when the caller does not override it.
pub const DEFAULT_CONTEXT_LINES: usize = 20;

/// Hard cap on rendered chunk text.
pub const MAX_CHUNK_LINES: usize = 100;

/// One reviewable slice of a file's diff.
#[derive(Debug, Clone)]
pub struct DiffChunk {
    /// New path when available, old path otherwise.
    pub filename: String,
    pub old_path: String,
    pub language: &'static str,
    /// Rendered diff text: changed lines with `+`/`-`, context with a space.
    pub hunk_text: String,
    pub additions: u32,
    pub deletions: u32,
    /// New-file line numbers of the additions, in order.
    pub changed_lines: Vec<u32>,
    /// Attached later, once the head-side file content has been fetched.
    pub file_context: Option<FileContext>,
}

/// One parsed diff line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DiffLine {
    Added { new_line: u32, content: String },
    Removed { content: String },
    Context { content: String },
}

/// One parsed hunk.
#[derive(Debug, Clone)]
struct DiffHunk {
    lines: Vec<DiffLine>,
}

/// Builds chunks for every reviewable file of a compare result.
pub fn process_diffs(files: &[FileDiff], context_lines: usize) -> Vec<DiffChunk> {
    let mut chunks = Vec::new();
    for file in files {
        if file.deleted_file {
            continue;
        }
        let Some(diff) = &file.diff else {
            continue; // binary or oversized
        };
        if looks_like_binary_patch(diff) {
            continue;
        }

        let filename = if file.new_path.is_empty() {
            file.old_path.clone()
        } else {
            file.new_path.clone()
        };
        let language = language_from_path(&filename);

        for hunk in parse_unified_diff(diff) {
            if let Some(chunk) =
                build_chunk(&hunk, &filename, &file.old_path, language, context_lines)
            {
                chunks.push(chunk);
            }
        }
    }
    chunks
}

/// Parses unified diff text into hunks. Only `@@` headers are required;
/// `\ No newline at end of file` markers are ignored.
fn parse_unified_diff(s: &str) -> Vec<DiffHunk> {
    let mut hunks = Vec::new();
    let mut lines_buf: Vec<DiffLine> = Vec::new();
    let mut new_line = 0u32;
    let mut in_hunk = false;

    for line in s.lines() {
        if line.starts_with("@@") {
            if in_hunk && !lines_buf.is_empty() {
                hunks.push(DiffHunk {
                    lines: std::mem::take(&mut lines_buf),
                });
            }
            if let Some((_, right)) = line
                .trim_start_matches('@')
                .trim_end_matches('@')
                .trim()
                .split_once('+')
            {
                let (n_start, _) = split_nums(right.trim());
                new_line = n_start;
                in_hunk = true;
            }
            continue;
        }

        if line.starts_with("\\ ") {
            continue;
        }
        if !in_hunk {
            // Skip file headers and any prelude until the first '@@'.
            continue;
        }

        if let Some(rest) = line.strip_prefix('+') {
            lines_buf.push(DiffLine::Added {
                new_line,
                content: rest.to_string(),
            });
            new_line += 1;
        } else if let Some(rest) = line.strip_prefix('-') {
            lines_buf.push(DiffLine::Removed {
                content: rest.to_string(),
            });
        } else {
            let rest = line.strip_prefix(' ').unwrap_or(line);
            lines_buf.push(DiffLine::Context {
                content: rest.to_string(),
            });
            new_line += 1;
        }
    }

    if in_hunk && !lines_buf.is_empty() {
        hunks.push(DiffHunk { lines: lines_buf });
    }
    hunks
}

/// Assembles one chunk from a hunk: all changed lines, plus up to
/// `context_lines` unchanged lines before and after each addition (stopping
/// at the next change, deduplicated by original index).
fn build_chunk(
    hunk: &DiffHunk,
    filename: &str,
    old_path: &str,
    language: &'static str,
    context_lines: usize,
) -> Option<DiffChunk> {
    let lines = &hunk.lines;
    let mut include: BTreeSet<usize> = BTreeSet::new();
    let mut additions = 0u32;
    let mut deletions = 0u32;
    let mut changed_lines = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        match line {
            DiffLine::Added { new_line, .. } => {
                include.insert(i);
                additions += 1;
                changed_lines.push(*new_line);

                // Preceding unchanged lines, newest first, until a change.
                let mut taken = 0;
                for j in (0..i).rev() {
                    if taken >= context_lines {
                        break;
                    }
                    match &lines[j] {
                        DiffLine::Context { .. } => {
                            include.insert(j);
                            taken += 1;
                        }
                        _ => break,
                    }
                }

                // Following unchanged lines, halting early at the next change.
                let mut taken = 0;
                for (j, next) in lines.iter().enumerate().skip(i + 1) {
                    if taken >= context_lines {
                        break;
                    }
                    match next {
                        DiffLine::Context { .. } => {
                            include.insert(j);
                            taken += 1;
                        }
                        _ => break,
                    }
                }
            }
            DiffLine::Removed { .. } => {
                include.insert(i);
                deletions += 1;
            }
            DiffLine::Context { .. } => {}
        }
    }

    if additions == 0 && deletions == 0 {
        return None;
    }

    let mut rendered: Vec<String> = include
        .iter()
        .map(|&i| match &lines[i] {
            DiffLine::Added { content, .. } => format!("+{content}"),
            DiffLine::Removed { content, .. } => format!("-{content}"),
            DiffLine::Context { content } => format!(" {content}"),
        })
        .collect();

    if rendered.len() > MAX_CHUNK_LINES {
        warn!(
            filename,
            lines = rendered.len(),
            cap = MAX_CHUNK_LINES,
            "chunk text truncated"
        );
        rendered.truncate(MAX_CHUNK_LINES);
    }

    Some(DiffChunk {
        filename: filename.to_string(),
        old_path: old_path.to_string(),
        language,
        hunk_text: rendered.join("\n"),
        additions,
        deletions,
        changed_lines,
        file_context: None,
    })
}

/// Splits "12,7" or "12" into (start, len).
fn split_nums(s: &str) -> (u32, u32) {
    let s = s.trim();
    if let Some((a, b)) = s.split_once(',') {
        (a.parse().unwrap_or(0), b.parse().unwrap_or(0))
    } else {
        (s.parse().unwrap_or(0), 0)
    }
}

/// Simple heuristic for binary patches inside unified diff text.
pub fn looks_like_binary_patch(s: &str) -> bool {
    s.contains("GIT binary patch")
        || s.starts_with("Binary files ")
        || (s.starts_with("Files ") && s.contains(" differ"))
}

/// Maps a file extension to a review language tag; `"unknown"` otherwise.
pub fn language_from_path(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "py" => "python",
        "java" => "java",
        "go" => "go",
        "rs" => "rust",
        "cpp" | "cc" | "cxx" => "cpp",
        "c" | "h" => "c",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "sql" => "sql",
        "sh" => "shell",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "md" => "markdown",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(diff: &str) -> FileDiff {
        FileDiff {
            old_path: "src/utils.ts".into(),
            new_path: "src/utils.ts".into(),
            new_file: false,
            renamed_file: false,
            deleted_file: false,
            diff: Some(diff.to_string()),
        }
    }

    const SIMPLE: &str = "@@ -1,5 +1,6 @@\n line one\n line two\n+added line\n line three\n-removed line\n line four\n";

    #[test]
    fn chunk_counts_changes_and_tracks_new_line_numbers() {
        let chunks = process_diffs(&[file(SIMPLE)], 10);
        assert_eq!(chunks.len(), 1);
        let c = &chunks[0];
        assert_eq!(c.filename, "src/utils.ts");
        assert_eq!(c.language, "typescript");
        assert_eq!(c.additions, 1);
        assert_eq!(c.deletions, 1);
        assert_eq!(c.changed_lines, vec![3]);
        assert!(c.hunk_text.contains("+added line"));
        assert!(c.hunk_text.contains("-removed line"));
    }

    #[test]
    fn context_is_bounded_and_deduplicated() {
        let mut diff = String::from("@@ -1,9 +1,10 @@\n");
        for i in 1..=4 {
            diff.push_str(&format!(" ctx before {i}\n"));
        }
        diff.push_str("+first\n");
        diff.push_str("+second\n");
        for i in 1..=4 {
            diff.push_str(&format!(" ctx after {i}\n"));
        }

        let chunks = process_diffs(&[file(&diff)], 2);
        let c = &chunks[0];
        let lines: Vec<&str> = c.hunk_text.lines().collect();
        // Two leading context lines (cap 2), both additions, two trailing.
        assert_eq!(
            lines,
            vec![
                " ctx before 3",
                " ctx before 4",
                "+first",
                "+second",
                " ctx after 1",
                " ctx after 2",
            ]
        );
        assert_eq!(c.changed_lines, vec![5, 6]);
    }

    #[test]
    fn following_context_halts_at_the_next_change() {
        let diff = "@@ -1,4 +1,4 @@\n+one\n ctx\n-gone\n ctx tail\n";
        let chunks = process_diffs(&[file(diff)], 10);
        let lines: Vec<&str> = chunks[0].hunk_text.lines().collect();
        assert_eq!(lines, vec!["+one", " ctx", "-gone"]);
    }

    #[test]
    fn deleted_and_binary_files_are_skipped() {
        let mut deleted = file(SIMPLE);
        deleted.deleted_file = true;
        let mut binary = file("Binary files a/logo.png and b/logo.png differ");
        binary.new_path = "logo.png".into();
        let none = FileDiff {
            diff: None,
            ..file(SIMPLE)
        };
        assert!(process_diffs(&[deleted, binary, none], 10).is_empty());
    }

    #[test]
    fn chunk_with_no_changes_is_dropped() {
        let diff = "@@ -1,2 +1,2 @@\n ctx\n ctx2\n";
        assert!(process_diffs(&[file(diff)], 10).is_empty());
    }

    #[test]
    fn chunk_text_is_capped() {
        let mut diff = String::from("@@ -1,1 +1,200 @@\n");
        for i in 0..200 {
            diff.push_str(&format!("+line {i}\n"));
        }
        let chunks = process_diffs(&[file(&diff)], 10);
        let c = &chunks[0];
        assert_eq!(c.hunk_text.lines().count(), MAX_CHUNK_LINES);
        assert_eq!(c.additions, 200);
        assert_eq!(c.changed_lines.len(), 200);
    }

    #[test]
    fn language_detection_covers_the_known_map() {
        assert_eq!(language_from_path("a/b/mod.rs"), "rust");
        assert_eq!(language_from_path("app.tsx"), "typescript");
        assert_eq!(language_from_path("script.py"), "python");
        assert_eq!(language_from_path("query.sql"), "sql");
        assert_eq!(language_from_path("deploy.yml"), "yaml");
        assert_eq!(language_from_path("README.md"), "markdown");
        assert_eq!(language_from_path("strange.xyz"), "unknown");
        assert_eq!(language_from_path("noextension"), "unknown");
    }

    #[test]
    fn new_path_preferred_and_old_path_fallback() {
        let mut renamed = file(SIMPLE);
        renamed.new_path = "src/renamed.ts".into();
        let chunks = process_diffs(&[renamed], 10);
        assert_eq!(chunks[0].filename, "src/renamed.ts");
        assert_eq!(chunks[0].old_path, "src/utils.ts");

        let mut no_new = file(SIMPLE);
        no_new.new_path = String::new();
        let chunks = process_diffs(&[no_new], 10);
        assert_eq!(chunks[0].filename, "src/utils.ts");
    }
}
