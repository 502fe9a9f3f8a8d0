//! HTTP error responses.
//!
//! Rejections by the rate limiter are not errors; they are normal `429`
//! responses produced by the handler. This type covers requests the limiter
//! could not evaluate at all.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::RatewellError;

/// Error returned from HTTP handlers, rendered as `{"error": "message"}`.
#[derive(Debug)]
pub enum ApiError {
    /// Invalid request parameters (400).
    BadRequest(String),
    /// Unexpected server error (500).
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<RatewellError> for ApiError {
    fn from(err: RatewellError) -> Self {
        match err {
            RatewellError::InvalidArgument(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
