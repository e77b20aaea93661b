//! Import scanning over a file's prefix.
//!
//! Each language gets a small regex family describing its import-like lines;
//! unknown languages fall back to the TypeScript-style family. The scan reads
//! at most [`MAX_SCAN_LINES`] lines, skips blanks and comment starters, and
//! stops after [`STOP_AFTER_MISSES`] consecutive lines that are none of the
//! above: imports live at the top of a file, so a run of plain code means
//! the import section is over.

use regex::Regex;

/// How deep into the file the scan reaches.
pub const MAX_SCAN_LINES: usize = 50;

/// Consecutive non-blank, non-comment, non-matching lines that end the scan.
pub const STOP_AFTER_MISSES: usize = 3;

/// Returns the import-like lines of `text` in order, indentation preserved.
pub fn extract_imports(text: &str, language: &str) -> Vec<String> {
    let patterns = patterns_for(language);
    let mut imports = Vec::new();
    let mut misses = 0usize;

    for line in text.lines().take(MAX_SCAN_LINES) {
        let trimmed = line.trim_start();

        if trimmed.is_empty() || is_comment_start(trimmed) {
            continue;
        }

        if patterns.iter().any(|re| re.is_match(line)) {
            imports.push(line.to_string());
            misses = 0;
        } else {
            misses += 1;
            if misses >= STOP_AFTER_MISSES {
                break;
            }
        }
    }
    imports
}

fn is_comment_start(trimmed: &str) -> bool {
    trimmed.starts_with("//")
        || trimmed.starts_with("/*")
        || trimmed.starts_with('*')
        || trimmed.starts_with('#')
}

/// Compiles the import pattern family for a language. The TypeScript family
/// is the explicit default for anything unrecognized.
fn patterns_for(language: &str) -> Vec<Regex> {
    let sources: &[&str] = match language {
        "python" => &[r"^\s*import\s+\w", r"^\s*from\s+\S+\s+import\b"],
        "java" => &[r"^\s*import\s", r"^\s*package\s"],
        "go" => &[r#"^\s*import\s+""#, r"^\s*import\s+\("],
        "rust" => &[r"^\s*use\s"],
        "php" => &[r"^\s*use\s", r"^\s*require", r"^\s*include"],
        // typescript/javascript and the default family
        _ => &[
            r"^\s*import\b",
            r"^\s*export\s*\{",
            r#"from\s+["']"#,
            r"^\s*(?:const|let|var)\s+.*=\s*require\(",
            r"^\s*type\s*\{",
        ],
    };
    sources
        .iter()
        .map(|s| Regex::new(s).expect("import pattern is valid"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typescript_imports_are_collected_in_order() {
        let text = "import { api } from './api';\n\
                    import type { Config } from './config';\n\
                    const fs = require('fs');\n\
                    export { helper } from './helper';\n\
                    \n\
                    function main() {}\n";
        let imports = extract_imports(text, "typescript");
        assert_eq!(
            imports,
            vec![
                "import { api } from './api';",
                "import type { Config } from './config';",
                "const fs = require('fs');",
                "export { helper } from './helper';",
            ]
        );
    }

    #[test]
    fn python_from_import_and_plain_import() {
        let text = "import os\nfrom typing import Optional\n\nVALUE = 1\n";
        let imports = extract_imports(text, "python");
        assert_eq!(imports, vec!["import os", "from typing import Optional"]);
    }

    #[test]
    fn rust_use_lines() {
        let text = "use std::fmt;\nuse serde::Deserialize;\n\npub struct S;\n";
        assert_eq!(
            extract_imports(text, "rust"),
            vec!["use std::fmt;", "use serde::Deserialize;"]
        );
    }

    #[test]
    fn java_package_and_import() {
        let text = "package com.acme.app;\n\nimport java.util.List;\n\nclass A {}\n";
        assert_eq!(
            extract_imports(text, "java"),
            vec!["package com.acme.app;", "import java.util.List;"]
        );
    }

    #[test]
    fn blanks_and_comments_do_not_break_the_scan() {
        let text = "// header comment\n\
                    /* block\n\
                     * still block\n\
                     */\n\
                    import { a } from './a';\n\
                    \n\
                    # not really rust but a comment marker\n\
                    import { b } from './b';\n";
        let imports = extract_imports(text, "typescript");
        assert_eq!(
            imports,
            vec!["import { a } from './a';", "import { b } from './b';"]
        );
    }

    #[test]
    fn scan_stops_after_three_consecutive_code_lines() {
        let text = "import { a } from './a';\n\
                    const x = 1;\n\
                    const y = 2;\n\
                    const z = 3;\n\
                    import { late } from './late';\n";
        let imports = extract_imports(text, "typescript");
        assert_eq!(imports, vec!["import { a } from './a';"]);
    }

    #[test]
    fn scan_never_reads_past_the_prefix() {
        // Identical prefixes yield identical results no matter what follows.
        let mut prefix = String::new();
        for i in 0..MAX_SCAN_LINES {
            prefix.push_str(&format!("import {{ m{i} }} from './m{i}';\n"));
        }
        let doubled = format!("{prefix}{prefix}");
        assert_eq!(
            extract_imports(&prefix, "typescript"),
            extract_imports(&doubled, "typescript")
        );
    }

    #[test]
    fn unknown_language_uses_the_default_family() {
        let text = "import { a } from './a';\ncode();\n";
        assert_eq!(
            extract_imports(text, "unknown"),
            vec!["import { a } from './a';"]
        );
    }

    #[test]
    fn indentation_is_preserved() {
        let text = "    import conditional from './cond';\nmain();\n";
        assert_eq!(
            extract_imports(text, "typescript"),
            vec!["    import conditional from './cond';"]
        );
    }
}
