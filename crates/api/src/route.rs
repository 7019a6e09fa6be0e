//! Query endpoints over the log store.

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use spunkless_common::store::query::{AdvancedSearch, LogStats, Paged};
use spunkless_common::store::StoredLog;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::{ApiError, ApiResult};
use crate::params::{ListParams, StatsParams};
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    let server = &state.config.server;

    let cors = if server.enable_cors {
        let origin = if server.cors_origins.iter().any(|o| o == "*") {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(server.cors_origins.iter().filter_map(|s| s.parse::<HeaderValue>().ok()))
        };
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        CorsLayer::new()
    };

    let request_timeout = state.config.request_timeout();
    let body_limit = server.body_limit_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/logs", get(list_logs_handler))
        .route("/api/logs/search", post(search_logs_handler))
        .route("/api/logs/{id}", get(get_log_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/metadata", get(metadata_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(cors),
        )
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// GET /api/logs
async fn list_logs_handler(
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Paged<StoredLog>>> {
    let filter = params.into_filter()?;
    let page = state.store.list(&filter).await.map_err(ApiError::store("Failed to fetch logs"))?;
    Ok(Json(page))
}

/// GET /api/logs/{id}
async fn get_log_handler(State(state): State<SharedState>, Path(id): Path<i32>) -> ApiResult<Json<StoredLog>> {
    state
        .store
        .fetch(id)
        .await
        .map_err(ApiError::store("Failed to fetch log"))?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// POST /api/logs/search
async fn search_logs_handler(
    State(state): State<SharedState>,
    Json(search): Json<AdvancedSearch>,
) -> ApiResult<Json<Paged<StoredLog>>> {
    let page = state.store.search(&search).await.map_err(ApiError::store("Failed to search logs"))?;
    Ok(Json(page))
}

/// GET /api/stats?timeRange=24h
async fn stats_handler(
    State(state): State<SharedState>,
    Query(params): Query<StatsParams>,
) -> ApiResult<Json<LogStats>> {
    let stats = state.store.stats(params.window()).await.map_err(ApiError::store("Failed to fetch stats"))?;
    Ok(Json(stats))
}

/// GET /api/metadata: values for the UI's filter dropdowns.
async fn metadata_handler(State(state): State<SharedState>) -> ApiResult<impl IntoResponse> {
    let (services, levels) = tokio::try_join!(state.store.distinct_services(), state.store.distinct_levels())
        .map_err(ApiError::store("Failed to fetch metadata"))?;
    Ok(Json(json!({ "services": services, "levels": levels })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use spunkless_common::settings::PostgresConfig;
    use spunkless_common::store::PgLogStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::conf::ApiConfig;
    use crate::state::ApiState;

    /// Router over a pool pointing at a closed port, so every query fails fast.
    fn app() -> Router {
        let postgres = PostgresConfig {
            host: "127.0.0.1".into(),
            port: 1,
            acquire_timeout_secs: 1,
            ..Default::default()
        };
        let store = PgLogStore::connect_lazy(&postgres);
        router(Arc::new(ApiState { config: ApiConfig::default(), store }))
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_database() {
        assert_eq!(send(get("/health")).await, (StatusCode::OK, json!({ "status": "ok" })));
    }

    #[tokio::test]
    async fn database_failure_is_a_generic_500() {
        for (uri, message) in [
            ("/api/logs?service=web", "Failed to fetch logs"),
            ("/api/logs/7", "Failed to fetch log"),
            ("/api/stats?timeRange=7d", "Failed to fetch stats"),
            ("/api/metadata", "Failed to fetch metadata"),
        ] {
            assert_eq!(
                send(get(uri)).await,
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message })),
                "{}",
                uri
            );
        }
    }

    #[tokio::test]
    async fn search_failure_is_reported() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/logs/search")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"services":["web"],"metadata":{"userId":42}}"#))
            .unwrap();

        assert_eq!(
            send(request).await,
            (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Failed to search logs" }))
        );
    }

    #[tokio::test]
    async fn bad_date_is_a_400_before_touching_the_database() {
        let (status, body) = send(get("/api/logs?startDate=yesterday")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid startDate: yesterday" }));
    }

    #[tokio::test]
    async fn non_numeric_id_is_rejected() {
        let (status, _) = send(get("/api/logs/abc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
