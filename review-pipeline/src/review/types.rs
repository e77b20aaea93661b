//! Issue model and strict-JSON response parsing.
//!
//! The model is asked for exactly one JSON object; real responses still
//! arrive wrapped in code fences or with fields missing, so parsing strips
//! fences and coerces every per-issue field to a default instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Issue severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Score impact of one issue of this severity.
    pub fn impact(self) -> i64 {
        match self {
            Severity::Critical => 15,
            Severity::High => 10,
            Severity::Medium => 5,
            Severity::Low => 2,
        }
    }

    /// Severities at or above this one get an inline comment.
    pub fn warrants_inline_comment(self) -> bool {
        matches!(self, Severity::Critical | Severity::High | Severity::Medium)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }

    fn parse_or_low(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// Issue category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Security,
    Performance,
    Logic,
    Style,
}

impl IssueType {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueType::Security => "security",
            IssueType::Performance => "performance",
            IssueType::Logic => "logic",
            IssueType::Style => "style",
        }
    }

    fn parse_or_style(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "security" => IssueType::Security,
            "performance" => IssueType::Performance,
            "logic" => IssueType::Logic,
            _ => IssueType::Style,
        }
    }
}

/// One issue reported by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub file: String,
    /// New-file line number.
    pub line: u32,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub message: String,
    pub suggestion: String,
}

/// One review response: a summary plus zero or more issues.
#[derive(Debug, Clone, Default)]
pub struct ReviewOutcome {
    pub summary: String,
    pub issues: Vec<Issue>,
}

/// Strips leading/trailing fenced-code markers from a model response.
pub fn strip_code_fences(raw: &str) -> &str {
    let s = raw.trim();
    let s = s
        .strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim()
}

/// Parses a model response into a [`ReviewOutcome`].
///
/// Requires a JSON object with a string `summary` and an array `issues`;
/// anything else returns `None` so the caller can retry. Per-issue fields are
/// coerced: `line` defaults to 0, `severity` to low, `type` to style, and
/// text fields to placeholder strings. `default_file` fills the `file` field
/// for single-chunk reviews where the prompt does not ask for one.
pub fn parse_review_response(raw: &str, default_file: Option<&str>) -> Option<ReviewOutcome> {
    let value: Value = serde_json::from_str(strip_code_fences(raw)).ok()?;

    let summary = value.get("summary")?.as_str()?.to_string();
    let issues_raw = value.get("issues")?.as_array()?;

    let issues = issues_raw
        .iter()
        .map(|v| coerce_issue(v, default_file))
        .collect();

    Some(ReviewOutcome { summary, issues })
}

fn coerce_issue(v: &Value, default_file: Option<&str>) -> Issue {
    let file = v
        .get("file")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| default_file.map(str::to_string))
        .unwrap_or_default();
    let line = v.get("line").and_then(Value::as_u64).unwrap_or(0) as u32;
    let severity = v
        .get("severity")
        .and_then(Value::as_str)
        .map(Severity::parse_or_low)
        .unwrap_or(Severity::Low);
    let issue_type = v
        .get("type")
        .and_then(Value::as_str)
        .map(IssueType::parse_or_style)
        .unwrap_or(IssueType::Style);
    let message = v
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("No description")
        .to_string();
    let suggestion = v
        .get("suggestion")
        .and_then(Value::as_str)
        .unwrap_or("No suggestion")
        .to_string();

    Issue {
        file,
        line,
        severity,
        issue_type,
        message,
        suggestion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_response_parses() {
        let raw = "```json\n{\"summary\":\"ok\",\"issues\":[]}\n```";
        let outcome = parse_review_response(raw, None).unwrap();
        assert_eq!(outcome.summary, "ok");
        assert!(outcome.issues.is_empty());
    }

    #[test]
    fn missing_fields_are_coerced_to_defaults() {
        let raw = r#"{"summary":"s","issues":[{}]}"#;
        let outcome = parse_review_response(raw, Some("src/app.ts")).unwrap();
        let issue = &outcome.issues[0];
        assert_eq!(issue.file, "src/app.ts");
        assert_eq!(issue.line, 0);
        assert_eq!(issue.severity, Severity::Low);
        assert_eq!(issue.issue_type, IssueType::Style);
        assert_eq!(issue.message, "No description");
        assert_eq!(issue.suggestion, "No suggestion");
    }

    #[test]
    fn explicit_file_wins_over_default() {
        let raw = r#"{"summary":"s","issues":[{"file":"a.ts","line":4,"severity":"high","type":"logic","message":"m","suggestion":"sg"}]}"#;
        let outcome = parse_review_response(raw, Some("b.ts")).unwrap();
        assert_eq!(outcome.issues[0].file, "a.ts");
        assert_eq!(outcome.issues[0].line, 4);
        assert_eq!(outcome.issues[0].severity, Severity::High);
        assert_eq!(outcome.issues[0].issue_type, IssueType::Logic);
    }

    #[test]
    fn unknown_enum_text_falls_back() {
        let raw = r#"{"summary":"s","issues":[{"severity":"catastrophic","type":"cosmic"}]}"#;
        let outcome = parse_review_response(raw, None).unwrap();
        assert_eq!(outcome.issues[0].severity, Severity::Low);
        assert_eq!(outcome.issues[0].issue_type, IssueType::Style);
    }

    #[test]
    fn non_object_and_missing_required_fields_fail() {
        assert!(parse_review_response("not json", None).is_none());
        assert!(parse_review_response(r#"{"issues":[]}"#, None).is_none());
        assert!(parse_review_response(r#"{"summary":"s"}"#, None).is_none());
        assert!(parse_review_response(r#"{"summary":1,"issues":[]}"#, None).is_none());
    }

    #[test]
    fn severity_gate_and_impact() {
        assert!(Severity::Critical.warrants_inline_comment());
        assert!(Severity::Medium.warrants_inline_comment());
        assert!(!Severity::Low.warrants_inline_comment());
        assert_eq!(Severity::Critical.impact(), 15);
        assert_eq!(Severity::High.impact(), 10);
        assert_eq!(Severity::Medium.impact(), 5);
        assert_eq!(Severity::Low.impact(), 2);
    }
}
