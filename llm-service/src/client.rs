//! Thin chat-completion client.
//!
//! Supported operation:
//! - `POST {completions_url}`: synchronous chat completion (non-streaming)
//!
//! The request body carries `{model, messages, max_completion_tokens}` and
//! the response is read from `choices[0].message.content`; the `usage` object
//! is logged as structured fields for observability.

use std::time::Duration;

use reqwest::{header, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::LlmConfig;

/// Upper bound on generated tokens per completion.
const MAX_COMPLETION_TOKENS: u32 = 40_000;

/// Default request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Errors produced by [`LlmClient`].
#[derive(Debug, Error)]
pub enum LlmError {
    /// Credentials are not configured; the client never leaves the process.
    #[error("llm client is disabled: no credentials configured")]
    Disabled,

    /// Transport/HTTP client error.
    #[error("llm transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-successful HTTP status from upstream.
    #[error("llm unexpected HTTP status {status}: {snippet}")]
    HttpStatus { status: StatusCode, snippet: String },

    /// The completion returned no content.
    #[error("llm empty response: no choices returned")]
    EmptyResponse,

    /// Unexpected/invalid JSON response.
    #[error("llm failed to decode response: {0}")]
    Decode(String),
}

impl LlmError {
    /// True for failures a fresh attempt can plausibly fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Transport(_) | LlmError::EmptyResponse => true,
            LlmError::HttpStatus { status, .. } => {
                status.as_u16() == 429 || status.is_server_error()
            }
            LlmError::Disabled | LlmError::Decode(_) => false,
        }
    }
}

/// Token accounting as reported by the provider.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One completed chat turn.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// Chat-completion client. Constructed once at startup and shared.
///
/// A client built from `None` config is *disabled*: `is_enabled` returns
/// false and `complete` fails fast with [`LlmError::Disabled`].
pub struct LlmClient {
    inner: Option<Enabled>,
}

struct Enabled {
    http: reqwest::Client,
    url: String,
    model: String,
}

impl LlmClient {
    /// Builds a client from optional configuration.
    ///
    /// # Errors
    /// [`LlmError::Transport`] if the HTTP client cannot be built.
    pub fn new(cfg: Option<LlmConfig>) -> Result<Self, LlmError> {
        let Some(cfg) = cfg else {
            return Ok(Self { inner: None });
        };

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", cfg.api_key))
                .map_err(|e| LlmError::Decode(format!("invalid API key header: {e}")))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .gzip(true)
            .build()?;

        Ok(Self {
            inner: Some(Enabled {
                http,
                url: cfg.completions_url(),
                model: cfg.model,
            }),
        })
    }

    /// Convenience constructor reading the environment.
    pub fn from_env() -> Result<Self, LlmError> {
        Self::new(LlmConfig::from_env())
    }

    /// Whether credentials are configured.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Performs one non-streaming chat completion.
    ///
    /// # Errors
    /// - [`LlmError::Disabled`] when no credentials are configured
    /// - [`LlmError::HttpStatus`] for non-2xx responses
    /// - [`LlmError::EmptyResponse`] when no content comes back
    /// - [`LlmError::Decode`] when the body cannot be parsed
    pub async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError> {
        let inner = self.inner.as_ref().ok_or(LlmError::Disabled)?;

        let body = ChatCompletionRequest {
            model: &inner.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_completion_tokens: MAX_COMPLETION_TOKENS,
        };

        debug!(model = %inner.model, "POST {}", inner.url);
        let resp = inner.http.post(&inner.url).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet = text.chars().take(240).collect::<String>();
            return Err(LlmError::HttpStatus { status, snippet });
        }

        let out: ChatCompletionResponse = resp.json().await.map_err(|e| {
            LlmError::Decode(format!(
                "serde error: {e}; expected `choices[0].message.content`"
            ))
        })?;

        if let Some(usage) = &out.usage {
            info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "llm token usage"
            );
        }

        let content = out
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        Ok(Completion {
            content,
            usage: out.usage,
        })
    }
}

/* ==========================
HTTP payloads
========================== */

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_client_reports_itself() {
        let client = LlmClient::new(None).unwrap();
        assert!(!client.is_enabled());
    }

    #[tokio::test]
    async fn disabled_client_fails_fast() {
        let client = LlmClient::new(None).unwrap();
        let err = client.complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, LlmError::Disabled));
        assert!(!err.is_retryable());
    }

    #[test]
    fn retryable_classification() {
        assert!(LlmError::EmptyResponse.is_retryable());
        assert!(LlmError::HttpStatus {
            status: StatusCode::TOO_MANY_REQUESTS,
            snippet: String::new(),
        }
        .is_retryable());
        assert!(!LlmError::HttpStatus {
            status: StatusCode::BAD_REQUEST,
            snippet: String::new(),
        }
        .is_retryable());
        assert!(!LlmError::Decode("bad".into()).is_retryable());
    }
}
