use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::error::{MemoryError, MemoryResult};
use super::types::LongTermRecord;

/// Append-only log of completed exchanges
#[async_trait]
pub trait LongTermStore: Send + Sync {
    async fn append(&self, record: &LongTermRecord) -> MemoryResult<()>;

    /// All records in insertion order
    async fn list(&self) -> MemoryResult<Vec<LongTermRecord>>;

    async fn ping(&self) -> MemoryResult<()>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

pub struct PgLongTermStore {
    pool: PgPool,
    table: String,
}

// Internal row type for SQLx mapping; the id column is never selected
#[derive(Debug, FromRow)]
struct HistoryRow {
    timestamp: DateTime<Utc>,
    user_query: String,
    assistant_reply: String,
}

impl From<HistoryRow> for LongTermRecord {
    fn from(row: HistoryRow) -> Self {
        LongTermRecord {
            timestamp: row.timestamp,
            user_query: row.user_query,
            assistant_reply: row.assistant_reply,
        }
    }
}

impl PgLongTermStore {
    pub async fn connect(url: &str, max_connections: u32, table: &str) -> MemoryResult<Self> {
        if !is_valid_table_name(table) {
            return Err(MemoryError::StoreUnavailable(format!(
                "invalid long-term table name: {}",
                table
            )));
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await?;

        let store = Self { pool, table: table.to_string() };
        store.initialize_schema().await?;
        info!("Long-term store ready (table: {})", store.table);
        Ok(store)
    }

    async fn initialize_schema(&self) -> MemoryResult<()> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                timestamp TIMESTAMPTZ NOT NULL,
                user_query TEXT NOT NULL,
                assistant_reply TEXT NOT NULL
            )
            "#,
            self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass
fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl LongTermStore for PgLongTermStore {
    async fn append(&self, record: &LongTermRecord) -> MemoryResult<()> {
        let sql = format!(
            "INSERT INTO {} (timestamp, user_query, assistant_reply) VALUES ($1, $2, $3)",
            self.table
        );
        sqlx::query(&sql)
            .bind(record.timestamp)
            .bind(&record.user_query)
            .bind(&record.assistant_reply)
            .execute(&self.pool)
            .await
            .map_err(|e: sqlx::Error| {
                error!("Database error appending long-term record: {}", e);
                MemoryError::from(e)
            })?;
        Ok(())
    }

    async fn list(&self) -> MemoryResult<Vec<LongTermRecord>> {
        let sql = format!(
            "SELECT timestamp, user_query, assistant_reply FROM {} ORDER BY id ASC",
            self.table
        );
        let rows: Vec<HistoryRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e: sqlx::Error| {
                error!("Database error listing long-term records: {}", e);
                MemoryError::from(e)
            })?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ping(&self) -> MemoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ============================================================================
// In-process
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryLongTermStore {
    records: Arc<RwLock<Vec<LongTermRecord>>>,
}

impl InMemoryLongTermStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LongTermStore for InMemoryLongTermStore {
    async fn append(&self, record: &LongTermRecord) -> MemoryResult<()> {
        self.records.write().push(record.clone());
        Ok(())
    }

    async fn list(&self) -> MemoryResult<Vec<LongTermRecord>> {
        Ok(self.records.read().clone())
    }

    async fn ping(&self) -> MemoryResult<()> {
        Ok(())
    }
}
