//! Application configuration and shared state.

use std::{env, fmt, sync::Arc};

use storage::Database;

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Bind address for the HTTP server, e.g. `0.0.0.0:8080`.
    pub api_address: String,
    /// Path of the SQLite database file.
    pub database_url: String,
    /// Base URL of the forge, e.g. `https://forge.example.com`.
    pub forge_host: String,
    /// Access token for the forge REST API.
    pub forge_token: String,
    /// Shared secret expected in `X-Forge-Token`. When absent, inbound
    /// webhooks are rejected with 401.
    pub webhook_secret: Option<String>,
    /// Number of review workers consuming the queue.
    pub review_workers: usize,
    /// Log instead of posting forge comments.
    pub dry_run: bool,
}

/// Errors that may occur while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Required variable is missing or empty.
    MissingVar { name: &'static str },
    /// Variable is present but contains an invalid value.
    InvalidValue { name: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingVar { name } => {
                write!(f, "missing required environment variable: {}", name)
            }
            ConfigError::InvalidValue { name, reason } => {
                write!(f, "invalid value for {}: {}", name, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl AppConfig {
    /// Load configuration strictly from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        fn must_var(name: &'static str) -> Result<String, ConfigError> {
            let v = env::var(name).map_err(|_| ConfigError::MissingVar { name })?;
            if v.trim().is_empty() {
                return Err(ConfigError::MissingVar { name });
            }
            Ok(v)
        }

        fn optional_var(name: &'static str) -> Option<String> {
            env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        let api_address = must_var("API_ADDRESS")?;
        let database_url = must_var("DATABASE_URL")?;
        let forge_host = must_var("FORGE_HOST")?;
        let forge_token = must_var("FORGE_ACCESS_TOKEN")?;
        let webhook_secret = optional_var("FORGE_WEBHOOK_SECRET");

        if !(forge_host.starts_with("http://") || forge_host.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                name: "FORGE_HOST",
                reason: "expected http(s) URL".into(),
            });
        }

        let review_workers = match optional_var("REVIEW_WORKERS") {
            Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                name: "REVIEW_WORKERS",
                reason: format!("expected a positive integer, got {v:?}"),
            })?,
            None => 2,
        };
        let dry_run = matches!(
            optional_var("FORGE_DRY_RUN").as_deref(),
            Some("true") | Some("1")
        );

        Ok(Self {
            api_address,
            database_url,
            forge_host,
            forge_token,
            webhook_secret,
            review_workers,
            dry_run,
        })
    }
}

/// Shared application state for all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration.
    pub config: Arc<AppConfig>,
    /// Database handle; also the job queue's backing store.
    pub db: Arc<Database>,
}

impl AppState {
    /// Create state from pre-loaded configuration.
    pub fn new(config: Arc<AppConfig>, db: Arc<Database>) -> Self {
        Self { config, db }
    }
}
