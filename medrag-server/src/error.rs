//! Mapping of [`MedragError`] onto HTTP responses.
//!
//! Validation failures keep their message and answer `400`. Everything else
//! is logged server-side and answered `500` with [`INTERNAL_DETAIL`].

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use medrag_core::MedragError;
use serde_json::json;
use tracing::error;

/// Detail returned for every failure that is not the caller's fault.
pub const INTERNAL_DETAIL: &str = "Query processing error";

/// An error as seen by HTTP clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request was rejected; the message is safe to show.
    BadRequest(String),
    /// Something failed server-side; the cause has already been logged.
    Internal,
}

impl From<MedragError> for ApiError {
    fn from(err: MedragError) -> Self {
        match err {
            MedragError::InvalidQuery(message) => ApiError::BadRequest(message),
            other => {
                error!(error = %other, "query processing failed");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_DETAIL.to_string()),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
