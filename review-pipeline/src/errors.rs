//! Crate-wide error hierarchy for the review pipeline.
//!
//! Goals:
//! - Single root `Error` for all public functions.
//! - Forge-aware mapping (401 -> Unauthorized, 429 -> RateLimited, 5xx -> Server).
//! - Ergonomic `?` via `From` impls, no dynamic dispatch.

use thiserror::Error;

/// Convenient alias for pipeline results.
pub type PipelineResult<T> = Result<T, Error>;

/// Root error type for the review pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Forge REST failure.
    #[error(transparent)]
    Forge(#[from] ForgeError),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] storage::errors::StoreError),
}

/// Detailed forge-specific error used inside the forge layer.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Unauthorized (HTTP 401).
    #[error("forge unauthorized")]
    Unauthorized,

    /// Forbidden (HTTP 403).
    #[error("forge forbidden")]
    Forbidden,

    /// Not found (HTTP 404).
    #[error("forge not found")]
    NotFound,

    /// Rate limited (HTTP 429).
    #[error("forge rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Gateway/Server error (HTTP 5xx).
    #[error("forge server error: status {0}")]
    Server(u16),

    /// Other HTTP status not covered above.
    #[error("forge http status error: {0}")]
    HttpStatus(u16),

    /// Timeout at transport level.
    #[error("forge timeout")]
    Timeout,

    /// Network/transport failure without status (DNS/connect/reset).
    #[error("forge network error: {0}")]
    Network(String),

    /// JSON deserialization error.
    #[error("forge serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Unexpected/invalid shape of forge response.
    #[error("forge invalid response: {0}")]
    InvalidResponse(String),
}

impl ForgeError {
    /// Transient failures worth another request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ForgeError::RateLimited { .. }
                | ForgeError::Server(_)
                | ForgeError::Timeout
                | ForgeError::Network(_)
        )
    }
}

impl From<reqwest::Error> for ForgeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return ForgeError::Timeout;
        }
        if let Some(status) = e.status() {
            let code = status.as_u16();
            return match code {
                401 => ForgeError::Unauthorized,
                403 => ForgeError::Forbidden,
                404 => ForgeError::NotFound,
                429 => ForgeError::RateLimited {
                    retry_after_secs: None,
                },
                500..=599 => ForgeError::Server(code),
                _ => ForgeError::HttpStatus(code),
            };
        }
        ForgeError::Network(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Forge(ForgeError::from(e))
    }
}
