use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

/// Failure taxonomy for the data endpoints. A degraded price feed is not an
/// error (the fallback table substitutes transparently); everything else is
/// surfaced immediately, never retried.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} is required")]
    MissingParam(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingParam(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(cause) => {
                // Log the underlying cause; the response body stays generic.
                log::error!("api.error {:#}", cause);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
