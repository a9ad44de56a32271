use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid ride start code")]
    InvalidCode,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Failures of the in-process event bus. Never surfaced to passengers directly.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("publish to {topic} cancelled")]
    Cancelled { topic: String },

    #[error("publish to {topic} timed out")]
    TimedOut { topic: String },

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<BusError> for AppError {
    fn from(err: BusError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InvalidState(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidCode => (
                StatusCode::BAD_REQUEST,
                "invalid ride start code".to_string(),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
