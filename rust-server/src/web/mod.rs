//! Web module: webhook ingestion, query, stats, and health endpoints.
//!
//! Handlers compose the pure pipeline stages (signature check, payload
//! validation, store insert) and map outcomes to boundary status codes.

pub mod handlers;
pub mod payload;
pub mod signature;

use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::info;
use uuid::Uuid;

pub use handlers::{
    health_live, health_ready, messages, render_metrics, stats, webhook, AppState,
    ErrorResponse, HealthResponse, MessagesParams, MessagesResponse, WebhookResponse,
};
pub use payload::{parse_webhook_payload, ValidationError, WebhookMessage};
pub use signature::verify_signature;

/// Per-request tracking middleware.
///
/// Times the request, feeds the path/status counter and the latency
/// histogram, and emits one structured log line with a correlation id.
pub async fn track_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();
    state.metrics.record_http(&path, status);
    state.metrics.observe_latency(latency_ms);

    info!(
        request_id = %Uuid::new_v4(),
        method = %method,
        path = %path,
        status = status,
        latency_ms = latency_ms,
        "http_request"
    );

    response
}
