use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Stored context is not valid: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TTL must be at least one second")]
    InvalidTtl,
}

impl From<redis::RedisError> for MemoryError {
    fn from(e: redis::RedisError) -> Self {
        MemoryError::StoreUnavailable(format!("cache store: {}", e))
    }
}

impl From<sqlx::Error> for MemoryError {
    fn from(e: sqlx::Error) -> Self {
        MemoryError::StoreUnavailable(format!("long-term store: {}", e))
    }
}

pub type MemoryResult<T> = Result<T, MemoryError>;
