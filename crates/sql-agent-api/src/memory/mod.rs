//! Conversational memory
//!
//! - Short-term: rolling context per session in the cache store, with TTL
//! - Response cache: reply per normalized query, with TTL
//! - Long-term: append-only log of every exchange

pub mod cache;
pub mod error;
pub mod long_term;
pub mod manager;
pub mod types;

pub use cache::{CacheStore, InMemoryCacheStore, RedisCacheStore};
pub use error::{MemoryError, MemoryResult};
pub use long_term::{InMemoryLongTermStore, LongTermStore, PgLongTermStore};
pub use manager::MemoryManager;
pub use types::{
    normalize_query, response_cache_key, ConversationTurn, LongTermRecord, Role, SessionId,
};
