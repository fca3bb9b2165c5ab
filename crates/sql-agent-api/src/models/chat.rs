use serde::{Deserialize, Serialize};

use crate::memory::LongTermRecord;

/// Message in the OpenAI-compatible wire format sent to the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearMemoryParams {
    #[serde(default)]
    pub session_id: Option<String>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
    pub cached: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub history: Vec<LongTermRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
