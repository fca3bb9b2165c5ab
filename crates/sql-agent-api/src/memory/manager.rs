use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::MemoryConfig;

use super::cache::CacheStore;
use super::error::MemoryResult;
use super::long_term::LongTermStore;
use super::types::{response_cache_key, ConversationTurn, LongTermRecord, SessionId};

/// Facade over the cache store and the long-term store.
///
/// Holds no conversational state of its own. The only thing kept here is a
/// lock per context key so that read-modify-write updates from concurrent
/// requests in this process do not drop each other's turns. Separate
/// processes sharing one cache store can still race.
pub struct MemoryManager {
    cache: Arc<dyn CacheStore>,
    long_term: Arc<dyn LongTermStore>,
    config: MemoryConfig,
    context_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MemoryManager {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        long_term: Arc<dyn LongTermStore>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            cache,
            long_term,
            config,
            context_locks: DashMap::new(),
        }
    }

    fn context_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.context_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the table entry once no other task holds or waits on the lock.
    /// Session ids come from clients, so entries must not outlive their use.
    fn release_context_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.context_locks
            .remove_if(key, |_, l| Arc::strong_count(l) == 1);
    }

    // ===== SHORT-TERM MEMORY =====

    /// Rolling context for `session`; empty when absent or expired
    pub async fn get_context(&self, session: &SessionId) -> MemoryResult<Vec<ConversationTurn>> {
        self.read_context(&session.context_key()).await
    }

    async fn read_context(&self, key: &str) -> MemoryResult<Vec<ConversationTurn>> {
        match self.cache.get(key).await? {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Ok(Vec::new()),
        }
    }

    /// Appends a user turn and an assistant turn, resetting expiration to the
    /// configured context TTL
    pub async fn update_context(
        &self,
        session: &SessionId,
        user_msg: &str,
        assistant_msg: &str,
    ) -> MemoryResult<()> {
        self.update_context_with_ttl(session, user_msg, assistant_msg, self.config.context_ttl())
            .await
    }

    pub async fn update_context_with_ttl(
        &self,
        session: &SessionId,
        user_msg: &str,
        assistant_msg: &str,
        expire: Duration,
    ) -> MemoryResult<()> {
        let key = session.context_key();
        let lock = self.context_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.append_turns(&key, user_msg, assistant_msg, expire).await
        };
        self.release_context_lock(&key, lock);

        let turns = result?;
        debug!("Context {} now holds {} turns", session, turns);
        Ok(())
    }

    async fn append_turns(
        &self,
        key: &str,
        user_msg: &str,
        assistant_msg: &str,
        expire: Duration,
    ) -> MemoryResult<usize> {
        let mut context = self.read_context(key).await?;
        context.push(ConversationTurn::user(user_msg));
        context.push(ConversationTurn::assistant(assistant_msg));

        let payload = serde_json::to_string(&context)?;
        self.cache.set_ex(key, &payload, expire).await?;
        Ok(context.len())
    }

    pub async fn clear_context(&self, session: &SessionId) -> MemoryResult<()> {
        let key = session.context_key();
        let lock = self.context_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.cache.delete(&key).await
        };
        self.release_context_lock(&key, lock);

        result?;
        debug!("Context {} cleared", session);
        Ok(())
    }

    // ===== RESPONSE CACHE =====

    pub async fn get_cached_response(&self, query: &str) -> MemoryResult<Option<String>> {
        self.cache.get(&response_cache_key(query)).await
    }

    /// Caches `response` under the normalized query for the configured TTL
    pub async fn cache_response(&self, query: &str, response: &str) -> MemoryResult<()> {
        self.cache_response_with_ttl(query, response, self.config.response_ttl())
            .await
    }

    pub async fn cache_response_with_ttl(
        &self,
        query: &str,
        response: &str,
        ttl: Duration,
    ) -> MemoryResult<()> {
        self.cache.set_ex(&response_cache_key(query), response, ttl).await
    }

    // ===== LONG-TERM MEMORY =====

    pub async fn store_long_term(&self, user_query: &str, assistant_reply: &str) -> MemoryResult<()> {
        self.long_term
            .append(&LongTermRecord::now(user_query, assistant_reply))
            .await
    }

    pub async fn get_long_term(&self) -> MemoryResult<Vec<LongTermRecord>> {
        self.long_term.list().await
    }

    /// Pings both stores
    pub async fn check_stores(&self) -> MemoryResult<()> {
        self.cache.ping().await?;
        self.long_term.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::cache::InMemoryCacheStore;
    use crate::memory::error::MemoryError;
    use crate::memory::long_term::InMemoryLongTermStore;
    use crate::memory::types::Role;

    fn manager_with(cache: InMemoryCacheStore) -> MemoryManager {
        MemoryManager::new(
            Arc::new(cache),
            Arc::new(InMemoryLongTermStore::new()),
            MemoryConfig::default(),
        )
    }

    fn manager() -> MemoryManager {
        manager_with(InMemoryCacheStore::new())
    }

    #[tokio::test]
    async fn test_context_empty_initially() {
        let memory = manager();
        assert!(memory.get_context(&SessionId::Global).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_context_records_turns_in_order() {
        let memory = manager();
        let session = SessionId::Global;
        memory.update_context(&session, "hi", "hello").await.unwrap();
        memory.update_context(&session, "bye", "goodbye").await.unwrap();

        let context = memory.get_context(&session).await.unwrap();
        assert_eq!(
            context,
            vec![
                ConversationTurn::user("hi"),
                ConversationTurn::assistant("hello"),
                ConversationTurn::user("bye"),
                ConversationTurn::assistant("goodbye"),
            ]
        );
    }

    #[tokio::test]
    async fn test_context_grows_by_two_per_exchange() {
        let memory = manager();
        let session = SessionId::Global;
        for n in 1..=7 {
            memory
                .update_context(&session, &format!("q{}", n), &format!("a{}", n))
                .await
                .unwrap();
            assert_eq!(memory.get_context(&session).await.unwrap().len(), 2 * n);
        }

        let context = memory.get_context(&session).await.unwrap();
        for (i, turn) in context.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(turn.role, expected);
        }
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_every_turn() {
        let memory = Arc::new(manager());
        let mut handles = Vec::new();
        for n in 0..16 {
            let memory = memory.clone();
            handles.push(tokio::spawn(async move {
                memory
                    .update_context(&SessionId::Global, &format!("q{}", n), &format!("a{}", n))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let context = memory.get_context(&SessionId::Global).await.unwrap();
        assert_eq!(context.len(), 32);
        for pair in context.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[0].content[1..], pair[1].content[1..]);
        }
    }

    #[tokio::test]
    async fn test_lock_table_empties_after_use() {
        let memory = manager();
        for n in 0..1000 {
            let session = SessionId::Named(format!("client-{}", n));
            memory.update_context(&session, "q", "a").await.unwrap();
            memory.clear_context(&session).await.unwrap();
        }
        assert!(memory.context_locks.is_empty());

        // sessions that are updated but never cleared release their lock too
        for n in 0..100 {
            let session = SessionId::Named(format!("idle-{}", n));
            memory.update_context(&session, "q", "a").await.unwrap();
        }
        assert!(memory.context_locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lock_table_empties_after_concurrent_updates() {
        let memory = Arc::new(manager());
        let mut handles = Vec::new();
        for n in 0..64 {
            let memory = memory.clone();
            handles.push(tokio::spawn(async move {
                let session = SessionId::Named(format!("s{}", n % 4));
                memory.update_context(&session, "q", "a").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(memory.context_locks.is_empty());
        for n in 0..4 {
            let session = SessionId::Named(format!("s{}", n));
            assert_eq!(memory.get_context(&session).await.unwrap().len(), 32);
        }
    }

    #[tokio::test]
    async fn test_failed_update_releases_lock() {
        let cache = InMemoryCacheStore::new();
        cache
            .set_ex("conversation_context:broken", "not json", Duration::from_secs(60))
            .await
            .unwrap();
        let memory = manager_with(cache);
        let session = SessionId::Named("broken".to_string());

        assert!(memory.update_context(&session, "q", "a").await.is_err());
        assert!(memory.context_locks.is_empty());
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let memory = manager();
        let session = SessionId::Global;
        memory.clear_context(&session).await.unwrap();
        assert!(memory.get_context(&session).await.unwrap().is_empty());

        memory.update_context(&session, "hi", "hello").await.unwrap();
        memory.clear_context(&session).await.unwrap();
        assert!(memory.get_context(&session).await.unwrap().is_empty());
        memory.clear_context(&session).await.unwrap();
        assert!(memory.get_context(&session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let memory = manager();
        let alice = SessionId::Named("alice".to_string());
        let bob = SessionId::Named("bob".to_string());

        memory.update_context(&alice, "hi", "hello alice").await.unwrap();
        memory.update_context(&bob, "hi", "hello bob").await.unwrap();
        memory.clear_context(&bob).await.unwrap();

        assert_eq!(memory.get_context(&alice).await.unwrap().len(), 2);
        assert!(memory.get_context(&bob).await.unwrap().is_empty());
        assert!(memory.get_context(&SessionId::Global).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_expires_after_inactivity() {
        let memory = manager();
        let session = SessionId::Global;
        memory.update_context(&session, "hi", "hello").await.unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        // activity resets the expiration window
        memory.update_context(&session, "again", "sure").await.unwrap();
        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(memory.get_context(&session).await.unwrap().len(), 4);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(memory.get_context(&session).await.unwrap().is_empty());

        // a fresh update after expiry starts from empty
        memory.update_context(&session, "new", "start").await.unwrap();
        assert_eq!(memory.get_context(&session).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_context_is_an_error() {
        let cache = InMemoryCacheStore::new();
        cache
            .set_ex("conversation_context", "not json", Duration::from_secs(60))
            .await
            .unwrap();
        let memory = manager_with(cache);

        let err = memory.get_context(&SessionId::Global).await.unwrap_err();
        assert!(matches!(err, MemoryError::Serialization(_)));

        let err = memory
            .update_context(&SessionId::Global, "hi", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_cache_round_trip_with_normalization() {
        let memory = manager();
        memory.cache_response("  Foo Bar  ", "answer").await.unwrap();

        for q in ["foo bar", "FOO BAR", "  Foo Bar  ", "Foo Bar"] {
            assert_eq!(memory.get_cached_response(q).await.unwrap().as_deref(), Some("answer"));
        }
        assert_eq!(memory.get_cached_response("foo  bar").await.unwrap(), None);
        assert_eq!(memory.get_cached_response("foo bar?").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cache_overwrites_same_normalized_key() {
        let memory = manager();
        memory.cache_response("Count rows", "1").await.unwrap();
        memory.cache_response("count rows ", "2").await.unwrap();
        assert_eq!(memory.get_cached_response("COUNT ROWS").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_response_expires() {
        let memory = manager();
        memory
            .cache_response_with_ttl("q", "r", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(memory.get_cached_response("q").await.unwrap().as_deref(), Some("r"));

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(memory.get_cached_response("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_long_term_is_append_only() {
        let memory = manager();
        memory.store_long_term("q1", "r1").await.unwrap();
        let before = memory.get_long_term().await.unwrap();
        assert_eq!(before.len(), 1);

        memory.store_long_term("q2", "r2").await.unwrap();
        let after = memory.get_long_term().await.unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[1].user_query, "q2");
        assert_eq!(after[1].assistant_reply, "r2");
        assert!(after[1].timestamp >= after[0].timestamp);
    }

    #[tokio::test]
    async fn test_check_stores() {
        assert!(manager().check_stores().await.is_ok());
    }
}
