//! HTTP surface: the forge webhook and its liveness endpoint.

mod core;
mod error_handler;
mod routes;

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, response::IntoResponse, routing::post, Router};
use tokio::signal;

pub use crate::core::app_state::{AppConfig, AppState, ConfigError};
pub use crate::error_handler::{AppError, AppResult};

use crate::routes::webhook::webhook_route::{forge_webhook, webhook_health};

/// Request body cap for inbound webhooks.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhooks/forge", post(forge_webhook))
        .route("/webhooks/forge/health", post(webhook_health))
        .fallback(handler_404)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Binds the configured address and serves until ctrl-c.
pub async fn start(state: Arc<AppState>) -> AppResult<()> {
    let addr = state.config.api_address.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(AppError::Bind)?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(AppError::Server)?;

    Ok(())
}

/// Graceful shutdown on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        eprintln!("failed to listen for shutdown signal: {e}");
    }
}

/// Fallback handler for unmatched routes.
async fn handler_404() -> impl IntoResponse {
    AppError::NotFound
}
