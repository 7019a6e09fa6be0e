//! HTTP surface of the producer: the ingestion endpoint plus health and metrics.

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{Extensions, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use spunkless_common::RecordError;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::gateway::GatewayError;
use crate::state::SharedState;

pub const INGEST_PATH: &str = "/spunkless-producer-api/logs";

pub fn router(state: SharedState) -> Router {
    let request_timeout = state.config.request_timeout();
    let body_limit = state.config.server.body_limit_bytes;

    Router::new()
        .route(INGEST_PATH, post(ingest_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// POST /spunkless-producer-api/logs
async fn ingest_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    extensions: Extensions,
    body: Bytes,
) -> Response {
    let origin = client_origin(&headers, extensions.get::<ConnectInfo<SocketAddr>>());

    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Unparseable submission body");
            state.gateway.metrics().record_rejected();
            return error_response(StatusCode::BAD_REQUEST, "Invalid JSON body");
        }
    };

    match state.gateway.submit(value, origin).await {
        Ok(_) => (StatusCode::ACCEPTED, Json(json!({ "status": "Log accepted" }))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "known_topics": state.gateway.resolver().known_count(),
    }))
}

async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "submissions": state.gateway.metrics().snapshot(),
        "known_topics": state.gateway.resolver().known_count(),
    }))
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::Rejected(RecordError::InvalidService(_)) => {
                error_response(StatusCode::BAD_REQUEST, "Invalid service name")
            }
            GatewayError::Rejected(_) => error_response(StatusCode::BAD_REQUEST, "Missing required fields"),
            // Already logged by the gateway; details stay server-side.
            GatewayError::Publish { .. } => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process log"),
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// First `X-Forwarded-For` hop when present, otherwise the peer address.
fn client_origin(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use spunkless_common::broker::fake::FakeBroker;
    use spunkless_common::broker::{BrokerError, BrokerFuture, LogPublisher};
    use spunkless_common::LogRecord;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::conf::ProducerConfig;
    use crate::state::ProducerState;

    fn app(broker: &Arc<FakeBroker>, max_attempts: u32) -> Router {
        let mut config = ProducerConfig::default();
        config.retry.max_attempts = max_attempts;
        router(Arc::new(ProducerState::new(config, broker.clone(), broker.clone())))
    }

    fn post_log(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(INGEST_PATH)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ── Ingestion ───────────────────────────────────────────────

    #[tokio::test]
    async fn accepts_valid_submission() {
        let broker = Arc::new(FakeBroker::new());
        let response = app(&broker, 1)
            .oneshot(post_log(r#"{"service":"auth-service","level":"error","message":"login failed","metadata":{"userId":42}}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(read_json(response).await, json!({ "status": "Log accepted" }));
        assert_eq!(broker.messages("logs-auth-service").await.len(), 1);
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let broker = Arc::new(FakeBroker::new());
        let response = app(&broker, 1)
            .oneshot(post_log(r#"{"service":"auth-service","level":"error"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await, json!({ "error": "Missing required fields" }));
        assert!(broker.topics().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let broker = Arc::new(FakeBroker::new());
        let response = app(&broker, 1).oneshot(post_log("{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await, json!({ "error": "Invalid JSON body" }));
    }

    #[tokio::test]
    async fn untopicable_service_is_rejected() {
        let broker = Arc::new(FakeBroker::new());
        let response = app(&broker, 1)
            .oneshot(post_log(r#"{"service":"auth service","level":"info","message":"m"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await, json!({ "error": "Invalid service name" }));
    }

    #[tokio::test]
    async fn broker_outage_is_a_server_error() {
        let broker = Arc::new(FakeBroker::new());
        broker.fail_admin(10).await;

        let response = app(&broker, 1)
            .oneshot(post_log(r#"{"service":"web","level":"info","message":"m"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await, json!({ "error": "Failed to process log" }));
    }

    /// Behaves like the Kafka client with the broker gone: each delivery
    /// waits out the configured message timeout, then fails.
    struct UnreachablePublisher {
        delay: Duration,
    }

    impl LogPublisher for UnreachablePublisher {
        fn publish<'a>(&'a self, _topic: &'a str, _key: &'a str, _payload: &'a [u8]) -> BrokerFuture<'a, ()> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                Err(BrokerError::Unavailable("all brokers down".into()))
            })
        }

        fn flush(&self, _timeout: Duration) -> BrokerFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_broker_exhausts_retries_before_request_timeout() {
        let config = ProducerConfig::default();
        config.validate().unwrap();

        let broker = Arc::new(FakeBroker::new());
        broker.add_topic("logs-web").await;
        let publisher = Arc::new(UnreachablePublisher {
            delay: Duration::from_millis(config.kafka.message_timeout_ms),
        });
        let state = Arc::new(ProducerState::new(config, broker.clone(), publisher));
        let app = router(state.clone());

        let response = app
            .oneshot(post_log(r#"{"service":"web","level":"info","message":"m"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(read_json(response).await, json!({ "error": "Failed to process log" }));
        let snap = state.gateway.metrics().snapshot();
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.retries, 4);
    }

    #[tokio::test]
    async fn forwarded_for_becomes_host() {
        let broker = Arc::new(FakeBroker::new());
        let mut request = post_log(r#"{"service":"web","level":"info","message":"m"}"#);
        request
            .headers_mut()
            .insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());

        let response = app(&broker, 1).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let stored = broker.messages("logs-web").await;
        let record = LogRecord::decode(&stored[0]).unwrap();
        assert_eq!(record.host.as_deref(), Some("203.0.113.9"));
    }

    // ── Origin resolution ───────────────────────────────────────

    #[test]
    fn origin_falls_back_to_peer() {
        let peer = ConnectInfo(SocketAddr::from(([192, 168, 1, 20], 51234)));
        assert_eq!(client_origin(&HeaderMap::new(), Some(&peer)).as_deref(), Some("192.168.1.20"));
        assert_eq!(client_origin(&HeaderMap::new(), None), None);
    }

    // ── Health & metrics ────────────────────────────────────────

    #[tokio::test]
    async fn metrics_report_rejections() {
        let broker = Arc::new(FakeBroker::new());
        let app = app(&broker, 1);

        app.clone().oneshot(post_log("[]")).await.unwrap();
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = read_json(response).await;
        assert_eq!(body["submissions"]["rejected"], json!(1));
        assert_eq!(body["submissions"]["accepted"], json!(0));
    }

    #[tokio::test]
    async fn health_is_ok() {
        let broker = Arc::new(FakeBroker::new());
        let response = app(&broker, 1)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], json!("ok"));
    }
}
