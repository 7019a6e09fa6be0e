//! HTTP surface of the consumer: health, ingest stats and metrics.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    let request_timeout = state.config.request_timeout();

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout)),
        )
        .with_state(state)
}

async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "subscribed_topics": state.subscription.borrow().len(),
    }))
}

/// GET /stats: last 24 hours by service and level.
async fn stats_handler(State(state): State<SharedState>) -> Response {
    match state.activity.recent_activity().await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to fetch stats");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Failed to fetch stats" }))).into_response()
        }
    }
}

async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ingest": state.metrics.snapshot(),
        "subscribed_topics": state.subscribed_topics(),
    }))
}
