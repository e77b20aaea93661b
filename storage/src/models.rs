//! Row types and the review status state machine.

use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// Lifecycle of a review record.
///
/// `Pending -> Processing -> {Completed, Failed, Skipped}`. Only a processing
/// review may reach a terminal state; the repository enforces this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::Processing => "PROCESSING",
            ReviewStatus::Completed => "COMPLETED",
            ReviewStatus::Failed => "FAILED",
            ReviewStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "PENDING" => Ok(ReviewStatus::Pending),
            "PROCESSING" => Ok(ReviewStatus::Processing),
            "COMPLETED" => Ok(ReviewStatus::Completed),
            "FAILED" => Ok(ReviewStatus::Failed),
            "SKIPPED" => Ok(ReviewStatus::Skipped),
            other => Err(StoreError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted review row.
#[derive(Debug, Clone)]
pub struct ReviewRow {
    pub id: String,
    pub merge_request_id: i64,
    pub merge_request_iid: i64,
    pub project_id: String,
    pub developer_id: String,
    pub title: String,
    pub source_url: String,
    pub source_branch: String,
    pub target_branch: String,
    pub status: ReviewStatus,
    pub review_content: serde_json::Value,
    pub quality_score: Option<i64>,
    pub issues_found: i64,
    pub suggestions_count: i64,
}

/// Everything the webhook knows about an inbound merge request, shaped for
/// the single intake transaction.
#[derive(Debug, Clone)]
pub struct WebhookIntake {
    pub forge_project_id: i64,
    pub project_name: String,
    pub project_namespace: String,
    /// Secret seeded into a project row on first sight.
    pub webhook_secret: String,
    pub forge_user_id: i64,
    pub username: String,
    pub developer_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub merge_request_id: i64,
    pub merge_request_iid: i64,
    pub title: String,
    pub description: Option<String>,
    pub source_url: String,
    pub source_branch: String,
    pub target_branch: String,
}

/// Result of the intake transaction.
#[derive(Debug, Clone)]
pub struct IntakeOutcome {
    pub review_id: String,
    /// False when an earlier delivery already created the review row.
    pub created: bool,
}

/// Terminal data written when a review completes.
#[derive(Debug, Clone)]
pub struct ReviewCompletion {
    pub quality_score: i64,
    pub issues_found: i64,
    pub suggestions_count: i64,
    pub review_content: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for s in [
            ReviewStatus::Pending,
            ReviewStatus::Processing,
            ReviewStatus::Completed,
            ReviewStatus::Failed,
            ReviewStatus::Skipped,
        ] {
            assert_eq!(ReviewStatus::parse(s.as_str()).unwrap(), s);
        }
    }

    #[test]
    fn unknown_status_is_an_error() {
        assert!(ReviewStatus::parse("DONE").is_err());
    }
}
