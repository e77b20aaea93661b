//! Chat-completion transport for the review pipeline.
//!
//! This crate knows nothing about diffs or reviews: it takes a system and a
//! user prompt, performs one non-streaming chat completion, and returns the
//! text body plus token usage. Retry policy lives with the caller; this layer
//! only classifies which failures are worth retrying.

pub mod client;
pub mod config;

pub use client::{Completion, LlmClient, LlmError, TokenUsage};
pub use config::LlmConfig;
