//! HTTP handlers for ingestion, querying, and stats.
//!
//! The webhook handler composes the pipeline stages explicitly — signature
//! check, then payload validation, then the idempotent insert — and
//! short-circuits on the first failure. Each outcome is recorded on the
//! injected metrics registry with a result tag before the response leaves.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::metrics::{Metrics, WebhookResult};
use crate::store::{InsertOutcome, ListFilter, Store, StoredMessage};
use crate::web::payload::parse_webhook_payload;
use crate::web::signature::verify_signature;

/// Header carrying the hex HMAC-SHA256 digest of the raw body.
const SIGNATURE_HEADER: &str = "x-signature";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, store: Store, metrics: Arc<Metrics>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            metrics,
        }
    }
}

// =============================================================================
// Health Checks
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness probe.
pub async fn health_live() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Readiness probe: storage round-trip plus a configured secret.
pub async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.config.secret_configured() && state.store.ping().await.is_ok() {
        (StatusCode::OK, Json(HealthResponse { status: "ok" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "not_ready" }),
        )
    }
}

// =============================================================================
// Webhook Ingestion
// =============================================================================

/// Webhook response body. `status` doubles as the failure reason.
#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

/// Error body for the read endpoints.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
}

/// Webhook ingestion endpoint.
///
/// Takes the raw body so the signature is computed over exactly the bytes
/// the caller signed, before any parsing. New and duplicate inserts both
/// return 200; idempotence is the contract, the tag is observability.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let secret = state.config.webhook_secret.as_deref().unwrap_or("");

    if !verify_signature(secret, &body, signature) {
        warn!(has_signature = !signature.is_empty(), "webhook_signature_invalid");
        state.metrics.record_webhook(WebhookResult::InvalidSignature);
        return (
            StatusCode::UNAUTHORIZED,
            Json(WebhookResponse {
                status: "invalid_signature",
            }),
        );
    }

    let message = match parse_webhook_payload(&body) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "webhook_validation_failed");
            state.metrics.record_webhook(WebhookResult::ValidationError);
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(WebhookResponse {
                    status: "validation_error",
                }),
            );
        }
    };

    match state.store.insert_message(&message).await {
        Ok(outcome) => {
            let result = match outcome {
                InsertOutcome::Created => WebhookResult::Created,
                InsertOutcome::Duplicate => WebhookResult::Duplicate,
            };
            state.metrics.record_webhook(result);
            info!(
                message_id = %message.message_id,
                result = result.as_str(),
                "webhook_stored"
            );
            (StatusCode::OK, Json(WebhookResponse { status: "ok" }))
        }
        Err(e) => {
            error!(error = %e, "webhook_store_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookResponse { status: "error" }),
            )
        }
    }
}

// =============================================================================
// Message Listing
// =============================================================================

fn default_limit() -> i64 {
    50
}

/// Query parameters for the listing endpoint. All filters optional.
#[derive(Debug, Deserialize)]
pub struct MessagesParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
}

/// Paginated listing response.
#[derive(Serialize)]
pub struct MessagesResponse {
    pub data: Vec<StoredMessage>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Filtered, paginated message listing.
pub async fn messages(
    State(state): State<AppState>,
    Query(params): Query<MessagesParams>,
) -> Response {
    // Blank params count as absent, so `?from=` lists everything instead of
    // matching the empty sender (and `?q=` cannot exclude null-text rows).
    let filter = ListFilter {
        from: params.from.filter(|s| !s.is_empty()),
        since: params.since.filter(|s| !s.is_empty()),
        q: params.q.filter(|s| !s.is_empty()),
    };

    match state
        .store
        .list_messages(params.limit, params.offset, &filter)
        .await
    {
        Ok(page) => Json(MessagesResponse {
            data: page.data,
            total: page.total,
            limit: params.limit,
            offset: params.offset,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "messages_query_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { status: "error" }),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Stats & Metrics
// =============================================================================

/// Corpus-wide summary statistics.
pub async fn stats(State(state): State<AppState>) -> Response {
    match state.store.stats().await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            error!(error = %e, "stats_query_failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse { status: "error" }),
            )
                .into_response()
        }
    }
}

/// Plain-text counter rendering.
pub async fn render_metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{
        body::Body,
        http::Request,
        routing::{get, post},
        Router,
    };
    use hmac::{Hmac, Mac};
    use http_body_util::BodyExt;
    use sha2::Sha256;
    use tower::ServiceExt;

    use crate::store::memory_store;

    const SECRET: &str = "test-secret";

    async fn test_app() -> Router {
        let config = Config {
            webhook_secret: Some(SECRET.to_string()),
            database_url: "sqlite::memory:".to_string(),
            port: 0,
        };
        let state = AppState::new(config, memory_store().await, Arc::new(Metrics::new()));

        Router::new()
            .route("/webhook", post(webhook))
            .route("/messages", get(messages))
            .route("/stats", get(stats))
            .route("/health/live", get(health_live))
            .route("/health/ready", get(health_ready))
            .route("/metrics", get(render_metrics))
            .with_state(state)
    }

    fn sign(body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_post(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("x-signature", sign(body.as_bytes()))
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    const VALID_BODY: &str =
        r#"{"message_id":"m1","from":"+1234","to":"+5678","ts":"2024-01-01T00:00:00Z","text":"hi"}"#;

    #[tokio::test]
    async fn test_webhook_missing_signature() {
        let app = test_app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .body(Body::from(VALID_BODY))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["status"], "invalid_signature");
    }

    #[tokio::test]
    async fn test_webhook_wrong_signature() {
        let app = test_app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("x-signature", sign(b"different body"))
            .body(Body::from(VALID_BODY))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_webhook_invalid_payload() {
        let app = test_app().await;
        let body = r#"{"message_id":"m1","from":"no-plus","to":"+5678","ts":"2024-01-01T00:00:00Z"}"#;
        let response = app.oneshot(signed_post(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["status"], "validation_error");
    }

    #[tokio::test]
    async fn test_webhook_insert_and_retry_both_succeed() {
        let app = test_app().await;

        for _ in 0..2 {
            let response = app.clone().oneshot(signed_post(VALID_BODY)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await["status"], "ok");
        }

        let response = app
            .oneshot(Request::builder().uri("/messages").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["message_id"], "m1");
        assert_eq!(body["data"][0]["from"], "+1234");
    }

    #[tokio::test]
    async fn test_messages_envelope_defaults() {
        let app = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/messages").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["limit"], 50);
        assert_eq!(body["offset"], 0);
        assert_eq!(body["total"], 0);
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_messages_filter_params() {
        let app = test_app().await;
        app.clone().oneshot(signed_post(VALID_BODY)).await.unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/messages?from=%2B1234&q=HI&limit=10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["limit"], 10);
    }

    const VALID_BODY_NO_TEXT: &str =
        r#"{"message_id":"m2","from":"+99","to":"+5678","ts":"2024-02-01T00:00:00Z"}"#;

    #[tokio::test]
    async fn test_messages_blank_params_are_ignored() {
        let app = test_app().await;
        app.clone().oneshot(signed_post(VALID_BODY)).await.unwrap();
        app.clone()
            .oneshot(signed_post(VALID_BODY_NO_TEXT))
            .await
            .unwrap();

        // `?from=` must list everything, not match the empty sender; a blank
        // `q` must not exclude the null-text row.
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/messages?from=&since=&q=")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["data"][0]["message_id"], "m1");
        assert_eq!(body["data"][1]["message_id"], "m2");
    }

    #[tokio::test]
    async fn test_stats_endpoint_shape() {
        let app = test_app().await;
        app.clone().oneshot(signed_post(VALID_BODY)).await.unwrap();

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["total_messages"], 1);
        assert_eq!(body["senders_count"], 1);
        assert_eq!(body["messages_per_sender"][0]["from"], "+1234");
        assert_eq!(body["first_message_ts"], "2024-01-01T00:00:00Z");
        assert_eq!(body["last_message_ts"], "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_health_probes() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_reports_missing_secret() {
        let config = Config {
            webhook_secret: None,
            database_url: "sqlite::memory:".to_string(),
            port: 0,
        };
        let state = AppState::new(config, memory_store().await, Arc::new(Metrics::new()));
        let app = Router::new()
            .route("/health/ready", get(health_ready))
            .with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_renders_webhook_tags() {
        let app = test_app().await;
        app.clone().oneshot(signed_post(VALID_BODY)).await.unwrap();
        app.clone().oneshot(signed_post(VALID_BODY)).await.unwrap();

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("webhook_requests_total{result=\"created\"} 1"));
        assert!(text.contains("webhook_requests_total{result=\"duplicate\"} 1"));
    }
}
