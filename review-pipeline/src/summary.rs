//! Quality scoring and the summary note posted to the merge request.

use std::collections::BTreeMap;

use crate::review::types::{Issue, IssueType, Severity};

/// Score starts here and is decremented per issue.
const BASE_SCORE: i64 = 100;

/// `100 - sum(impact)` over all retained issues, clamped at 0.
pub fn quality_score(issues: &[Issue]) -> i64 {
    let penalty: i64 = issues.iter().map(|i| i.severity.impact()).sum();
    (BASE_SCORE - penalty).max(0)
}

/// Renders the markdown summary note: score, counts by severity and type,
/// a per-file breakdown sorted most-severe-first, and a large-MR warning
/// naming both the reviewed and the skipped file counts when files were
/// skipped.
pub fn build_summary(
    summary_text: &str,
    issues: &[Issue],
    score: i64,
    reviewed_files: usize,
    skipped_files: usize,
) -> String {
    let mut s = String::new();
    s.push_str("## Automated Review\n\n");

    if !summary_text.trim().is_empty() {
        s.push_str(summary_text.trim());
        s.push_str("\n\n");
    }

    s.push_str(&format!("**Quality score: {score}/100**\n\n"));

    if issues.is_empty() {
        s.push_str("No issues found.\n");
    } else {
        s.push_str(&format!("**Issues found: {}**\n\n", issues.len()));

        s.push_str("| Severity | Count |\n|---|---|\n");
        for severity in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
        ] {
            let count = issues.iter().filter(|i| i.severity == severity).count();
            if count > 0 {
                s.push_str(&format!("| {} | {count} |\n", severity.as_str()));
            }
        }
        s.push('\n');

        s.push_str("| Type | Count |\n|---|---|\n");
        for issue_type in [
            IssueType::Security,
            IssueType::Performance,
            IssueType::Logic,
            IssueType::Style,
        ] {
            let count = issues.iter().filter(|i| i.issue_type == issue_type).count();
            if count > 0 {
                s.push_str(&format!("| {} | {count} |\n", issue_type.as_str()));
            }
        }
        s.push('\n');

        s.push_str("### By file\n\n");
        for (file, file_issues) in issues_by_file(issues) {
            s.push_str(&format!("**{file}**\n"));
            for issue in file_issues {
                s.push_str(&format!(
                    "- **{}** ({}) line {}: {}\n",
                    issue.severity.as_str(),
                    issue.issue_type.as_str(),
                    issue.line,
                    issue.message
                ));
            }
            s.push('\n');
        }
    }

    if skipped_files > 0 {
        s.push_str(&format!(
            "\n> **Large merge request**: only the first {reviewed_files} files were \
             reviewed; {skipped_files} additional file(s) were skipped.\n"
        ));
    }

    s
}

/// Groups issues per file, files ordered by their most severe issue first,
/// and each file's issues ordered by severity.
fn issues_by_file(issues: &[Issue]) -> Vec<(String, Vec<&Issue>)> {
    let mut by_file: BTreeMap<&str, Vec<&Issue>> = BTreeMap::new();
    for issue in issues {
        by_file.entry(issue.file.as_str()).or_default().push(issue);
    }

    let mut grouped: Vec<(String, Vec<&Issue>)> = by_file
        .into_iter()
        .map(|(file, mut list)| {
            list.sort_by_key(|i| i.severity);
            (file.to_string(), list)
        })
        .collect();

    grouped.sort_by_key(|(_, list)| list.first().map(|i| i.severity).unwrap_or(Severity::Low));
    grouped
}
