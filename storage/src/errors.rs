//! Error type for the storage layer.

use thiserror::Error;

/// Convenient alias for storage results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Root error for all storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A status column held text that is not a known review status.
    #[error("unknown review status: {0}")]
    UnknownStatus(String),

    /// A state transition the review state machine does not allow.
    #[error("illegal review transition for {id} to {to}")]
    IllegalTransition { id: String, to: &'static str },

    #[error("row not found: {0}")]
    NotFound(String),
}
