//! LLM review driving: issue model, prompt assembly, response parsing.

pub mod llm;
pub mod prompt;
pub mod types;

pub use llm::Reviewer;
pub use types::{Issue, IssueType, ReviewOutcome, Severity};
