//! Issue verification: false-positive filtering before anything is posted.
//!
//! The verifier never *invents* severity; it only decides whether an issue
//! survives. Routing is by message keywords:
//! - import-related claims are checked against the context's scanned imports
//!   (or the full head-side file when the context has none),
//! - definition-related claims are checked against the context lines, then an
//!   extended window around the reported line, then that window's imports,
//! - security and performance issues bypass verification,
//! - anything else passes unverified with medium confidence.
//!
//! Every evidence-fetch failure degrades to "valid, low confidence": on
//! missing evidence an issue is kept, never dropped.
//!
//! Known false-negative source: the capitalized-token fallback of
//! [`extract_identifier`] can latch onto a proper noun in the message, which
//! makes the claim pass verification rather than lose it.

use regex::Regex;
use tracing::{debug, warn};

use crate::context::{build_file_context, FileContext};
use crate::forge::ForgeClient;
use crate::review::types::{Issue, IssueType};

/// Window radius for the extended definition lookup.
const EXTENDED_CONTEXT_RADIUS: u32 = 50;

/// Confidence attached to a verification verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Verdict for one issue.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub is_valid: bool,
    pub confidence: Confidence,
    pub reason: String,
}

impl VerificationResult {
    fn valid(confidence: Confidence, reason: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            confidence,
            reason: reason.into(),
        }
    }

    fn false_positive(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            confidence: Confidence::High,
            reason: reason.into(),
        }
    }
}

/// Stateless checker bound to one merge request's head commit.
pub struct Verifier<'a> {
    forge: &'a ForgeClient,
    project_id: i64,
    head_sha: &'a str,
}

impl<'a> Verifier<'a> {
    pub fn new(forge: &'a ForgeClient, project_id: i64, head_sha: &'a str) -> Self {
        Self {
            forge,
            project_id,
            head_sha,
        }
    }

    /// Classifies `issue` as real or false positive.
    pub async fn verify(&self, issue: &Issue, context: Option<&FileContext>) -> VerificationResult {
        let message = issue.message.to_lowercase();

        if is_import_related(&message) {
            return self.verify_import_issue(issue, &message, context).await;
        }
        if is_definition_related(&message) {
            return self.verify_definition_issue(issue, context).await;
        }
        if matches!(issue.issue_type, IssueType::Security | IssueType::Performance) {
            return VerificationResult::valid(
                Confidence::High,
                "security/performance issues are not filtered",
            );
        }
        VerificationResult::valid(Confidence::Medium, "issue type not verified")
    }

    async fn verify_import_issue(
        &self,
        issue: &Issue,
        message: &str,
        context: Option<&FileContext>,
    ) -> VerificationResult {
        let Some(name) = extract_identifier(&issue.message, IdentifierKind::Import) else {
            return VerificationResult::valid(
                Confidence::Low,
                "could not extract an import name from the message",
            );
        };

        if message.contains("duplicate") {
            let Some(ctx) = context else {
                return VerificationResult::valid(
                    Confidence::Low,
                    "no context available to count duplicate imports",
                );
            };
            let count = ctx
                .imports
                .iter()
                .filter(|line| import_line_matches(line, &name))
                .count();
            return if count >= 2 {
                VerificationResult::valid(
                    Confidence::High,
                    format!("'{name}' appears {count} times in the imports"),
                )
            } else {
                VerificationResult::false_positive(format!(
                    "'{name}' is imported at most once"
                ))
            };
        }

        if let Some(ctx) = context.filter(|c| !c.imports.is_empty()) {
            if ctx.imports.iter().any(|line| import_line_matches(line, &name)) {
                return VerificationResult::false_positive(format!(
                    "'{name}' is present in the file's imports"
                ));
            }
            return VerificationResult::valid(
                Confidence::High,
                format!("'{name}' is not among the file's imports"),
            );
        }

        // No scanned imports to consult: check the whole head-side file.
        match self
            .forge
            .get_file_content(self.project_id, &issue.file, self.head_sha)
            .await
        {
            Ok(content) if content.contains(&name) => VerificationResult::false_positive(
                format!("'{name}' appears in the file content"),
            ),
            Ok(_) => VerificationResult::valid(
                Confidence::High,
                format!("'{name}' does not appear in the file"),
            ),
            Err(e) => {
                warn!(file = %issue.file, error = %e, "import verification fetch failed");
                VerificationResult::valid(Confidence::Low, "could not fetch file to verify import")
            }
        }
    }

    async fn verify_definition_issue(
        &self,
        issue: &Issue,
        context: Option<&FileContext>,
    ) -> VerificationResult {
        let Some(name) = extract_identifier(&issue.message, IdentifierKind::Identifier) else {
            return VerificationResult::valid(
                Confidence::Low,
                "could not extract an identifier from the message",
            );
        };

        if let Some(ctx) = context {
            if ctx.lines.iter().any(|line| looks_like_definition(line, &name)) {
                return VerificationResult::false_positive(format!(
                    "'{name}' is defined within the provided context"
                ));
            }
        }

        // Widen the window around the reported line before giving up.
        let extended = match self
            .forge
            .get_file_content(self.project_id, &issue.file, self.head_sha)
            .await
        {
            Ok(content) => build_file_context(
                &content,
                crate::diff::language_from_path(&issue.file),
                issue.line.max(1),
                EXTENDED_CONTEXT_RADIUS,
            ),
            Err(e) => {
                warn!(file = %issue.file, error = %e, "definition verification fetch failed");
                return VerificationResult::valid(
                    Confidence::Low,
                    "could not fetch extended context to verify definition",
                );
            }
        };

        if extended
            .lines
            .iter()
            .any(|line| looks_like_definition(line, &name))
        {
            return VerificationResult::false_positive(format!(
                "'{name}' is defined near the reported line"
            ));
        }
        if extended.imports.iter().any(|line| line.contains(&name)) {
            return VerificationResult::false_positive(format!(
                "'{name}' is brought in by an import"
            ));
        }

        debug!(identifier = %name, "definition not found; keeping issue");
        VerificationResult::valid(Confidence::High, format!("no definition of '{name}' found"))
    }
}

/// True when the message claims an import problem.
pub fn is_import_related(message_lower: &str) -> bool {
    ["import", "not imported", "missing import", "cannot find"]
        .iter()
        .any(|kw| message_lower.contains(kw))
}

/// True when the message claims an undefined identifier.
pub fn is_definition_related(message_lower: &str) -> bool {
    [
        "not defined",
        "undefined",
        "not declared",
        "cannot find name",
    ]
    .iter()
    .any(|kw| message_lower.contains(kw))
}

/// What kind of token the fallback extraction should look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// Import names: first Capitalized token.
    Import,
    /// Plain identifiers: first lowerCamel token.
    Identifier,
}

/// Pulls the identifier an issue message is talking about.
///
/// Quoted forms win: `'X'`, `"X"`, `` `X` ``. Without quotes, imports fall
/// back to the first capitalized token and identifiers to the first
/// lowerCamel token.
pub fn extract_identifier(message: &str, kind: IdentifierKind) -> Option<String> {
    for quote_re in [
        r"'([A-Za-z_][A-Za-z0-9_]*)'",
        r#""([A-Za-z_][A-Za-z0-9_]*)""#,
        r"`([A-Za-z_][A-Za-z0-9_]*)`",
    ] {
        let re = Regex::new(quote_re).expect("quote pattern is valid");
        if let Some(caps) = re.captures(message) {
            return Some(caps[1].to_string());
        }
    }

    let fallback = match kind {
        IdentifierKind::Import => r"\b[A-Z][A-Za-z0-9_]*\b",
        IdentifierKind::Identifier => r"\b[a-z][a-z0-9]*[A-Z][A-Za-z0-9]*\b",
    };
    let re = Regex::new(fallback).expect("fallback pattern is valid");
    re.find(message).map(|m| m.as_str().to_string())
}

/// Whether an import line covers `name`: substring hit, or a destructured
/// list member whose pre-`as` token equals `name`.
pub fn import_line_matches(line: &str, name: &str) -> bool {
    line.contains(name) || destructured_member_matches(line, name)
}

/// Whether a destructured list in `line` (`{ a, b as c, d }`) has a member
/// whose pre-`as` token equals `name`. Aliases after `as` do not count.
fn destructured_member_matches(line: &str, name: &str) -> bool {
    let braced = Regex::new(r"\{([^}]*)\}").expect("brace pattern is valid");
    match braced.captures(line) {
        Some(caps) => caps[1].split(',').any(|member| {
            member
                .split(" as ")
                .next()
                .map(str::trim)
                .is_some_and(|token| token == name)
        }),
        None => false,
    }
}

/// Whether `line` defines `name`: declaration keywords, a function, an arrow
/// assignment, or a type-level declaration.
pub fn looks_like_definition(line: &str, name: &str) -> bool {
    let escaped = regex::escape(name);
    let patterns = [
        format!(r"(?:const|let|var)\s+{escaped}\b"),
        format!(r"function\s+{escaped}\b"),
        format!(r"{escaped}\s*=\s*\("),
        format!(r"(?:class|interface|type|enum)\s+{escaped}\b"),
    ];
    patterns.iter().any(|p| {
        Regex::new(p)
            .expect("definition pattern is valid")
            .is_match(line)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_keywords() {
        assert!(is_import_related("missing import 'X'"));
        assert!(is_import_related("cannot find module"));
        assert!(!is_import_related("possible null dereference"));

        assert!(is_definition_related("`foo` is not defined"));
        assert!(is_definition_related("undefined variable"));
        assert!(is_definition_related("cannot find name 'bar'"));
        assert!(!is_definition_related("slow loop"));
    }

    #[test]
    fn identifier_extraction_table() {
        let cases = [
            ("missing import 'X'", IdentifierKind::Import, Some("X")),
            (
                "missing import \"HttpClient\"",
                IdentifierKind::Import,
                Some("HttpClient"),
            ),
            ("`useCache` is not defined", IdentifierKind::Identifier, Some("useCache")),
            (
                "the symbol MyService is not imported",
                IdentifierKind::Import,
                Some("MyService"),
            ),
            (
                "variable parseConfig is not declared",
                IdentifierKind::Identifier,
                Some("parseConfig"),
            ),
            ("nothing to see here", IdentifierKind::Identifier, None),
        ];
        for (message, kind, expected) in cases {
            assert_eq!(
                extract_identifier(message, kind).as_deref(),
                expected,
                "message: {message}"
            );
        }
    }

    #[test]
    fn import_line_matching_table() {
        let cases = [
            ("import { X } from './x';", "X", true),
            ("import { a, bee as c, d } from './m';", "c", true),
            ("import { a, bee as c, d } from './m';", "bee", true),
            ("import { longName } from './m';", "other", false),
            ("const fs = require('fs');", "fs", true),
            ("import os", "sys", false),
        ];
        for (line, name, expected) in cases {
            assert_eq!(import_line_matches(line, name), expected, "line: {line}");
        }
    }

    /// Pins the destructuring branch directly: every name a member's
    /// pre-`as` token equals is covered, aliases and non-members are not,
    /// independent of the substring shortcut in `import_line_matches`.
    #[test]
    fn destructured_member_equality_uses_the_pre_alias_token() {
        let line = "import { a, bee as c, d } from './m';";
        assert!(destructured_member_matches(line, "bee"));
        assert!(destructured_member_matches(line, "a"));
        assert!(destructured_member_matches(line, "d"));
        // "c" is the alias, not the pre-`as` token.
        assert!(!destructured_member_matches(line, "c"));
        assert!(!destructured_member_matches(line, "missing"));
        // No destructured list at all.
        assert!(!destructured_member_matches("import plain from './m';", "plain"));
    }

    #[test]
    fn definition_matching_table() {
        let cases = [
            ("const total = 1;", "total", true),
            ("let counter;", "counter", true),
            ("var legacy = 0;", "legacy", true),
            ("function handle(req) {", "handle", true),
            ("const handler = (req) => {};", "handler", true),
            ("class Widget {", "Widget", true),
            ("interface Config {", "Config", true),
            ("type Alias = string;", "Alias", true),
            ("enum Mode {", "Mode", true),
            ("const totals = 1;", "total", false),
            ("return total + 1;", "total", false),
        ];
        for (line, name, expected) in cases {
            assert_eq!(looks_like_definition(line, name), expected, "line: {line}");
        }
    }
}
