use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::memory::MemoryError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<MemoryError> for ApiError {
    fn from(e: MemoryError) -> Self {
        match e {
            // stored data that no longer decodes is corruption, not an outage
            MemoryError::Serialization(_) => ApiError::InternalError(e.to_string()),
            MemoryError::StoreUnavailable(_) | MemoryError::InvalidTtl => {
                ApiError::StoreError(e.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            },
            ApiError::StoreError(msg) => {
                tracing::error!("Store error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "StoreError", msg)
            },
            ApiError::LlmError(msg) => {
                tracing::error!("LLM error: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "LlmError", msg)
            },
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            },
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
