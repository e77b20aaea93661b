//! POST /webhooks/forge
//!
//! Authenticates the delivery, filters to merge-request events, applies the
//! skip rules, persists project/developer/review in one transaction, then
//! enqueues the review job. Enqueue failure is logged but does not undo the
//! transaction: the review stays PENDING and visible to operations.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use storage::models::WebhookIntake;
use storage::queue::{QueueConfig, ReviewJob};
use tracing::{error, info, warn};

use crate::core::app_state::AppState;
use crate::error_handler::{AppError, AppResult};
use crate::routes::webhook::auth::secure_compare;
use crate::routes::webhook::webhook_request::WebhookPayload;

/// Event type this endpoint processes.
const MERGE_REQUEST_EVENT: &str = "Merge Request Hook";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_request_iid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Liveness endpoint for forge-side webhook tests.
pub async fn webhook_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn forge_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<WebhookPayload>, JsonRejection>,
) -> AppResult<Json<WebhookResponse>> {
    let Some(expected_secret) = state.config.webhook_secret.as_deref() else {
        error!("webhook received but FORGE_WEBHOOK_SECRET is not configured");
        return Err(AppError::Unauthorized("webhook secret not configured"));
    };

    let token = headers
        .get("X-Forge-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized("missing X-Forge-Token header"))?;
    if !secure_compare(token, expected_secret) {
        return Err(AppError::Unauthorized("invalid webhook token"));
    }

    let event = headers
        .get("X-Forge-Event")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing X-Forge-Event header".into()))?;
    if event != MERGE_REQUEST_EVENT {
        return Ok(Json(WebhookResponse {
            success: true,
            processed: Some(false),
            review_id: None,
            merge_request_iid: None,
            status: None,
        }));
    }

    let Json(payload) = payload.map_err(AppError::from)?;
    let valid = payload.validate().map_err(AppError::BadRequest)?;
    let attributes = valid.attributes;

    if attributes.should_skip() {
        info!(
            merge_request_iid = attributes.iid,
            action = attributes.action.as_deref().unwrap_or("-"),
            work_in_progress = attributes.work_in_progress,
            "delivery accepted but review skipped"
        );
        return Ok(Json(WebhookResponse {
            success: true,
            processed: Some(false),
            review_id: None,
            merge_request_iid: Some(attributes.iid),
            status: Some("skipped".into()),
        }));
    }

    let source_url = attributes
        .url
        .clone()
        .or_else(|| valid.project.web_url.clone())
        .unwrap_or_default();

    let intake = WebhookIntake {
        forge_project_id: valid.project.id,
        project_name: valid.project.name.clone(),
        project_namespace: valid.project.namespace.clone(),
        webhook_secret: expected_secret.to_string(),
        forge_user_id: valid.user.id,
        username: valid.user.username.clone(),
        developer_name: valid.user.name.clone(),
        email: valid.user.email.clone(),
        avatar_url: valid.user.avatar_url.clone(),
        merge_request_id: attributes.id,
        merge_request_iid: attributes.iid,
        title: attributes.title.clone(),
        description: attributes.description.clone(),
        source_url,
        source_branch: attributes.source_branch.clone(),
        target_branch: attributes.target_branch.clone(),
    };

    let outcome = state.db.record_merge_request(&intake)?;
    info!(
        review_id = %outcome.review_id,
        merge_request_iid = attributes.iid,
        created = outcome.created,
        "webhook recorded"
    );

    let job = ReviewJob {
        review_id: outcome.review_id.clone(),
        project_id: valid.project.id,
        merge_request_iid: attributes.iid,
    };
    if let Err(e) = state.db.enqueue(&QueueConfig::default(), &job) {
        // The review row stays PENDING; operators can re-enqueue it.
        warn!(review_id = %outcome.review_id, error = %e, "enqueue failed after intake");
    }

    Ok(Json(WebhookResponse {
        success: true,
        processed: None,
        review_id: Some(outcome.review_id),
        merge_request_iid: Some(attributes.iid),
        status: Some(if outcome.created {
            "pending".into()
        } else {
            "exists".into()
        }),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::app_state::AppConfig;
    use storage::repository::ReviewRepository;
    use storage::Database;

    fn state(secret: Option<&str>) -> Arc<AppState> {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let config = AppConfig {
            api_address: "127.0.0.1:0".into(),
            database_url: ":memory:".into(),
            forge_host: "https://forge.example.com".into(),
            forge_token: "token".into(),
            webhook_secret: secret.map(str::to_string),
            review_workers: 1,
            dry_run: false,
        };
        Arc::new(AppState::new(Arc::new(config), Arc::new(db)))
    }

    fn mr_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forge-Token", token.parse().unwrap());
        headers.insert("X-Forge-Event", MERGE_REQUEST_EVENT.parse().unwrap());
        headers
    }

    fn mr_payload() -> WebhookPayload {
        serde_json::from_value(serde_json::json!({
            "object_kind": "merge_request",
            "object_attributes": {
                "id": 1001,
                "iid": 3,
                "title": "Add widget cache",
                "source_branch": "feature/cache",
                "target_branch": "main",
                "url": "https://forge.example.com/acme/widgets/-/merge_requests/3",
                "action": "open"
            },
            "project": { "id": 42, "name": "widgets", "namespace": "acme" },
            "user": { "id": 7, "username": "jdoe", "name": "J. Doe" }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn accepted_delivery_creates_a_pending_review_and_a_job() {
        let state = state(Some("s3cret"));
        let resp = forge_webhook(
            State(state.clone()),
            mr_headers("s3cret"),
            Ok(Json(mr_payload())),
        )
        .await
        .unwrap();

        let review_id = resp.0.review_id.clone().unwrap();
        assert_eq!(resp.0.status.as_deref(), Some("pending"));
        let row = state.db.find_review(&review_id).unwrap().unwrap();
        assert_eq!(row.merge_request_iid, 3);

        let claimed = db_claim(&state);
        assert_eq!(claimed.job.review_id, review_id);
        assert_eq!(claimed.job.project_id, 42);
    }

    #[tokio::test]
    async fn redelivery_returns_the_existing_review() {
        let state = state(Some("s3cret"));
        let first = forge_webhook(
            State(state.clone()),
            mr_headers("s3cret"),
            Ok(Json(mr_payload())),
        )
        .await
        .unwrap();
        let second = forge_webhook(
            State(state.clone()),
            mr_headers("s3cret"),
            Ok(Json(mr_payload())),
        )
        .await
        .unwrap();

        assert_eq!(first.0.review_id, second.0.review_id);
        assert_eq!(second.0.status.as_deref(), Some("exists"));

        let count: i64 = state
            .db
            .find_review(&first.0.review_id.clone().unwrap())
            .unwrap()
            .map(|_| 1)
            .unwrap_or(0);
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn bad_or_missing_token_is_unauthorized() {
        let state = state(Some("s3cret"));

        let err = forge_webhook(
            State(state.clone()),
            mr_headers("wrong"),
            Ok(Json(mr_payload())),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let mut headers = HeaderMap::new();
        headers.insert("X-Forge-Event", MERGE_REQUEST_EVENT.parse().unwrap());
        let err = forge_webhook(State(state), headers, Ok(Json(mr_payload())))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unconfigured_secret_disables_the_endpoint() {
        let state = state(None);
        let err = forge_webhook(State(state), mr_headers("anything"), Ok(Json(mr_payload())))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn other_events_are_acknowledged_but_not_processed() {
        let state = state(Some("s3cret"));
        let mut headers = mr_headers("s3cret");
        headers.insert("X-Forge-Event", "Push Hook".parse().unwrap());

        let resp = forge_webhook(State(state.clone()), headers, Ok(Json(mr_payload())))
            .await
            .unwrap();
        assert_eq!(resp.0.processed, Some(false));
        assert!(resp.0.review_id.is_none());
        assert!(state
            .db
            .claim(&QueueConfig::default(), i64::MAX - 1)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn draft_and_foreign_actions_are_skipped() {
        let state = state(Some("s3cret"));

        let mut payload = mr_payload();
        payload.object_attributes.as_mut().unwrap().work_in_progress = true;
        let resp = forge_webhook(State(state.clone()), mr_headers("s3cret"), Ok(Json(payload)))
            .await
            .unwrap();
        assert_eq!(resp.0.status.as_deref(), Some("skipped"));
        assert!(resp.0.review_id.is_none());

        let mut payload = mr_payload();
        payload.object_attributes.as_mut().unwrap().action = Some("close".into());
        let resp = forge_webhook(State(state), mr_headers("s3cret"), Ok(Json(payload)))
            .await
            .unwrap();
        assert_eq!(resp.0.status.as_deref(), Some("skipped"));
    }

    #[tokio::test]
    async fn structurally_invalid_payload_is_a_bad_request() {
        let state = state(Some("s3cret"));
        let mut payload = mr_payload();
        payload.user = None;
        let err = forge_webhook(State(state), mr_headers("s3cret"), Ok(Json(payload)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    fn db_claim(state: &Arc<AppState>) -> storage::queue::ClaimedJob {
        state
            .db
            .claim(&QueueConfig::default(), chrono_now_ms())
            .unwrap()
            .expect("a job should be enqueued")
    }

    fn chrono_now_ms() -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64
    }
}
