use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::memory::MemoryManager;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Process liveness only; never touches the stores
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "running".to_string(),
        }),
    )
}

pub async fn readiness_check(
    State(memory): State<Arc<MemoryManager>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    match memory.check_stores().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready".to_string(),
                detail: None,
            }),
        ),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "unavailable".to_string(),
                    detail: Some(e.to_string()),
                }),
            )
        }
    }
}
