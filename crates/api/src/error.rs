use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use spunkless_common::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Log not found")]
    NotFound,

    #[error("{0}")]
    InvalidRequest(String),

    /// `action` is the client-facing message, e.g. "Failed to fetch logs".
    #[error("{action}: {source}")]
    Store {
        action: &'static str,
        #[source]
        source: StoreError,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn store(action: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Store { action, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Store { action, source } => {
                // Details stay server-side.
                tracing::error!(error = %source, "{}", action);
                (StatusCode::INTERNAL_SERVER_ERROR, action.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
