use std::sync::Arc;
use axum::extract::FromRef;

use crate::memory::MemoryManager;
use crate::services::AgentGateway;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub memory: Arc<MemoryManager>,
    pub agent: Arc<dyn AgentGateway>,
    /// Rendered system prompt, prepended to every agent call
    pub system_prompt: Arc<str>,
}

impl AppState {
    pub fn new(memory: Arc<MemoryManager>, agent: Arc<dyn AgentGateway>, system_prompt: String) -> Self {
        Self {
            memory,
            agent,
            system_prompt: system_prompt.into(),
        }
    }
}

impl FromRef<AppState> for Arc<MemoryManager> {
    fn from_ref(state: &AppState) -> Self {
        state.memory.clone()
    }
}
