//! Error types for the gateway API.
//!
//! [`ApiError`] unifies all failure modes into a single enum that
//! converts into an HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.
//! Validation failures map to 400, cooldowns to 429 with a `retry_at`
//! hint, and everything else to a 5xx. Tick-level faults never surface
//! here; they stay inside the scheduler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use pandemos_core::error::ActionError;

/// Errors that can occur in the gateway API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The submitted action was rejected.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Action(ActionError::Validation(err)) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": err.to_string(),
                    "status": StatusCode::BAD_REQUEST.as_u16(),
                }),
            ),
            Self::Action(ActionError::Cooldown { retry_at }) => (
                StatusCode::TOO_MANY_REQUESTS,
                serde_json::json!({
                    "error": self.to_string(),
                    "status": StatusCode::TOO_MANY_REQUESTS.as_u16(),
                    "retry_at": retry_at,
                }),
            ),
            Self::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({
                    "error": msg,
                    "status": StatusCode::NOT_FOUND.as_u16(),
                }),
            ),
            Self::Serialization(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({
                    "error": format!("JSON error: {err}"),
                    "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                }),
            ),
            Self::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({
                    "error": msg,
                    "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                }),
            ),
        };

        (status, axum::Json(body)).into_response()
    }
}
