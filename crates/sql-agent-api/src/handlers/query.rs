use axum::{extract::State, Json};
use std::time::Instant;
use tracing::{debug, info};

use crate::memory::SessionId;
use crate::models::chat::{ChatMessage, QueryRequest, QueryResponse};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// POST /query
///
/// 1. Response cache lookup (normalized query)
/// 2. Build messages: system prompt + rolling context + query
/// 3. Invoke the agent
/// 4. Write back: response cache, rolling context, long-term log
pub async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let start_time = Instant::now();

    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let session = SessionId::from_optional(request.session_id.as_deref());

    // An empty cached reply counts as a miss
    if let Some(cached) = state
        .memory
        .get_cached_response(&request.query)
        .await?
        .filter(|reply| !reply.is_empty())
    {
        debug!("Response cache hit for session {}", session);
        return Ok(Json(QueryResponse {
            response: cached,
            cached: true,
        }));
    }

    let context = state.memory.get_context(&session).await?;

    let mut messages = Vec::with_capacity(context.len() + 2);
    messages.push(ChatMessage::system(&*state.system_prompt));
    messages.extend(context.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(request.query.as_str()));

    let reply = state
        .agent
        .invoke(&messages)
        .await
        .map_err(|e| ApiError::LlmError(e.to_string()))?;

    state.memory.cache_response(&request.query, &reply).await?;
    state
        .memory
        .update_context(&session, &request.query, &reply)
        .await?;
    state.memory.store_long_term(&request.query, &reply).await?;

    info!(
        "Query answered: session={}, context_turns={}, reply_len={}, elapsed_ms={}",
        session,
        context.len(),
        reply.len(),
        start_time.elapsed().as_millis()
    );

    Ok(Json(QueryResponse {
        response: reply,
        cached: false,
    }))
}
