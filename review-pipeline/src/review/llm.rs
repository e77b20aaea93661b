//! Drives the LLM for single-chunk and batched reviews.
//!
//! Retry wraps the whole call-plus-parse: a network failure, an empty body,
//! and a malformed JSON response all trigger another attempt. When the budget
//! is spent the review degrades to an empty outcome with a synthetic summary
//! instead of failing the job.

use std::sync::Arc;

use llm_service::LlmClient;
use tracing::{debug, warn};

use crate::diff::DiffChunk;
use crate::review::prompt::{build_batched_prompt, build_single_prompt, SYSTEM_PROMPT};
use crate::review::types::{parse_review_response, ReviewOutcome};

/// Attempts per review call (call + parse counted together).
const MAX_ATTEMPTS: usize = 3;

/// Backoff between attempts.
const RETRY_DELAY_MS: u64 = 500;

/// Review driver over a shared chat-completion client.
#[derive(Clone)]
pub struct Reviewer {
    llm: Arc<LlmClient>,
}

impl Reviewer {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// Whether the underlying client has credentials.
    pub fn is_enabled(&self) -> bool {
        self.llm.is_enabled()
    }

    /// Reviews one chunk. Issues inherit the chunk's filename.
    pub async fn review_single(&self, chunk: &DiffChunk) -> ReviewOutcome {
        let prompt = build_single_prompt(chunk);
        self.drive(&prompt, Some(&chunk.filename)).await
    }

    /// Reviews several chunks in one call; issues carry their own `file`.
    pub async fn review_batched(&self, chunks: &[DiffChunk]) -> ReviewOutcome {
        let prompt = build_batched_prompt(chunks);
        self.drive(&prompt, None).await
    }

    async fn drive(&self, prompt: &str, default_file: Option<&str>) -> ReviewOutcome {
        if !self.llm.is_enabled() {
            return ReviewOutcome::default();
        }

        for attempt in 1..=MAX_ATTEMPTS {
            match self.llm.complete(SYSTEM_PROMPT, prompt).await {
                Ok(completion) => {
                    if let Some(outcome) = parse_review_response(&completion.content, default_file)
                    {
                        debug!(attempt, issues = outcome.issues.len(), "review parsed");
                        return outcome;
                    }
                    warn!(attempt, max = MAX_ATTEMPTS, "review response was not valid JSON");
                }
                Err(e) if e.is_retryable() => {
                    warn!(attempt, max = MAX_ATTEMPTS, error = %e, "review call failed");
                }
                Err(e) => {
                    warn!(error = %e, "review call failed terminally");
                    break;
                }
            }
            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(std::time::Duration::from_millis(RETRY_DELAY_MS)).await;
            }
        }

        ReviewOutcome {
            summary: "Review unavailable: the model did not return a usable response.".to_string(),
            issues: Vec::new(),
        }
    }
}
