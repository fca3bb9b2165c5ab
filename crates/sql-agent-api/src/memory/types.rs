use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::chat::ChatMessage;

/// Cache key holding the global rolling context
pub const CONTEXT_KEY: &str = "conversation_context";

/// Prefix for per-query response cache entries
pub const RESPONSE_CACHE_PREFIX: &str = "response_cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One side of a recorded exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        ChatMessage {
            role: turn.role.to_string(),
            content: turn.content.clone(),
        }
    }
}

/// Identifies one rolling context.
///
/// `SessionId::Global` is the single shared conversation slot; named sessions
/// get their own key under the same prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum SessionId {
    #[default]
    Global,
    Named(String),
}

impl SessionId {
    /// Blank or missing ids fall back to the global slot
    pub fn from_optional(id: Option<&str>) -> Self {
        match id.map(str::trim) {
            Some(id) if !id.is_empty() => SessionId::Named(id.to_string()),
            _ => SessionId::Global,
        }
    }

    pub fn context_key(&self) -> String {
        match self {
            SessionId::Global => CONTEXT_KEY.to_string(),
            SessionId::Named(id) => format!("{}:{}", CONTEXT_KEY, id),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionId::Global => write!(f, "global"),
            SessionId::Named(id) => write!(f, "{}", id),
        }
    }
}

/// Durable audit entry for one completed exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongTermRecord {
    pub timestamp: DateTime<Utc>,
    pub user_query: String,
    pub assistant_reply: String,
}

impl LongTermRecord {
    pub fn now(user_query: impl Into<String>, assistant_reply: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_query: user_query.into(),
            assistant_reply: assistant_reply.into(),
        }
    }
}

/// Trim then lower-case. Internal whitespace and punctuation are kept.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

pub fn response_cache_key(query: &str) -> String {
    format!("{}:{}", RESPONSE_CACHE_PREFIX, normalize_query(query))
}
