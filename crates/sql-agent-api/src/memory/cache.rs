use async_trait::async_trait;
use dashmap::DashMap;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::error::{MemoryError, MemoryResult};

/// Volatile key-value store with per-key expiration
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns None on miss or when the entry has expired
    async fn get(&self, key: &str) -> MemoryResult<Option<String>>;

    /// Stores `value`, replacing any previous entry, expiring `ttl` from now
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> MemoryResult<()>;

    /// Deleting a missing key is not an error
    async fn delete(&self, key: &str) -> MemoryResult<()>;

    async fn ping(&self) -> MemoryResult<()>;
}

fn ttl_seconds(ttl: Duration) -> MemoryResult<u64> {
    match ttl.as_secs() {
        0 => Err(MemoryError::InvalidTtl),
        secs => Ok(secs),
    }
}

// ============================================================================
// Redis
// ============================================================================

#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl RedisCacheStore {
    pub async fn connect(url: &str) -> MemoryResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to redis cache store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> MemoryResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> MemoryResult<()> {
        let secs = ttl_seconds(ttl)?;
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> MemoryResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn ping(&self) -> MemoryResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

// ============================================================================
// In-process
// ============================================================================

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Writes between two full sweeps of expired entries
const SWEEP_EVERY: u64 = 256;

/// DashMap-backed cache for development and tests.
///
/// Expired entries are dropped when read, and every `SWEEP_EVERY` writes the
/// whole map is swept so keys that are never read again do not accumulate.
/// Uses the tokio clock so paused-time tests can advance past a TTL.
#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    map: Arc<DashMap<String, Entry>>,
    writes: Arc<AtomicU64>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.map.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes `key` only if the stored entry is still expired at `now`, so a
    /// concurrent `set_ex` that replaced it is kept.
    fn remove_if_expired(&self, key: &str, now: Instant) -> bool {
        self.map.remove_if(key, |_, e| e.is_expired(now)).is_some()
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        let before = self.map.len();
        self.map.retain(|_, e| !e.is_expired(now));
        debug!("Cache sweep removed {} expired entries", before.saturating_sub(self.map.len()));
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> MemoryResult<Option<String>> {
        let now = Instant::now();
        let Some(entry) = self.map.get(key) else {
            return Ok(None);
        };
        if entry.is_expired(now) {
            drop(entry);
            if self.remove_if_expired(key, now) {
                debug!("Cache key {} expired, removed", key);
            }
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> MemoryResult<()> {
        let secs = ttl_seconds(ttl)?;
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now() + Duration::from_secs(secs),
        };
        self.map.insert(key.to_string(), entry);

        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep_expired();
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> MemoryResult<()> {
        self.map.remove(key);
        Ok(())
    }

    async fn ping(&self) -> MemoryResult<()> {
        Ok(())
    }
}
