use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::memory::{MemoryManager, SessionId};
use crate::models::chat::{ClearMemoryParams, HistoryResponse, MessageResponse};
use crate::utils::error::ApiError;

/// GET /memory - full long-term history
pub async fn memory_history(
    State(memory): State<Arc<MemoryManager>>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = memory.get_long_term().await?;
    Ok(Json(HistoryResponse { history }))
}

/// DELETE /memory/clear - drops the rolling context only
pub async fn clear_memory(
    State(memory): State<Arc<MemoryManager>>,
    Query(params): Query<ClearMemoryParams>,
) -> Result<Json<MessageResponse>, ApiError> {
    let session = SessionId::from_optional(params.session_id.as_deref());
    memory.clear_context(&session).await?;
    info!("Short-term memory cleared for session {}", session);

    Ok(Json(MessageResponse {
        message: "Short-term memory cleared.".to_string(),
    }))
}
