//! SQLite-backed message store.
//!
//! The `messages` table is the only shared mutable state in the service.
//! Rows are written exactly once by [`Store::insert_message`] and never
//! updated or deleted; the listing and stats queries are read-only.
//!
//! Idempotence rides on the `message_id` PRIMARY KEY: the insert attempt and
//! the uniqueness check are one atomic statement, so under concurrent
//! inserts of the same identifier exactly one caller observes `Created` and
//! the rest observe `Duplicate`. There is no pre-check.

pub mod types;

use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;

use crate::web::payload::WebhookMessage;

pub use types::{InsertOutcome, ListFilter, MessagePage, SenderCount, StatsSummary, StoredMessage};

/// Storage failure. Surfaced at the boundary as a server-side error; the
/// store never retries internally.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS messages (
    message_id  TEXT PRIMARY KEY,
    from_msisdn TEXT NOT NULL,
    to_msisdn   TEXT NOT NULL,
    ts          TEXT NOT NULL,
    text        TEXT,
    created_at  TEXT NOT NULL
)";

/// Supports the deterministic (ts, message_id) listing order.
const TS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_messages_ts ON messages (ts, message_id)";

/// Handle to the message table. Cheap to clone; clones share one pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Create the messages table and its listing index if absent.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        sqlx::query(TS_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    /// Trivial round-trip for the readiness probe.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a validated message, assigning `created_at` server-side.
    ///
    /// A `message_id` collision is a no-op reported as `Duplicate`; the
    /// first insert stays authoritative even when other fields differ.
    pub async fn insert_message(
        &self,
        message: &WebhookMessage,
    ) -> Result<InsertOutcome, StoreError> {
        let created_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let result = sqlx::query(
            "INSERT INTO messages (message_id, from_msisdn, to_msisdn, ts, text, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.message_id)
        .bind(&message.from)
        .bind(&message.to)
        .bind(&message.ts)
        .bind(message.text.as_deref())
        .bind(&created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Created),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(StoreError::Unavailable(e)),
        }
    }

    /// Filtered, paginated listing.
    ///
    /// Ordering is always ascending `(ts, message_id)` so pagination is
    /// stable across pages and repeated requests. `total` counts all rows
    /// matching the filters before `limit`/`offset` apply. A zero or
    /// negative `limit` yields an empty page with the correct total
    /// (SQLite would treat a negative LIMIT as unlimited, so it is not
    /// passed through).
    pub async fn list_messages(
        &self,
        limit: i64,
        offset: i64,
        filter: &ListFilter,
    ) -> Result<MessagePage, StoreError> {
        let mut clauses: Vec<&str> = Vec::new();
        if filter.from.is_some() {
            clauses.push("from_msisdn = ?");
        }
        if filter.since.is_some() {
            clauses.push("ts >= ?");
        }
        if filter.q.is_some() {
            clauses.push("LOWER(text) LIKE ?");
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let like_pattern = filter.q.as_ref().map(|q| format!("%{}%", q.to_lowercase()));

        let count_sql = format!("SELECT COUNT(*) FROM messages{where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(from) = &filter.from {
            count_query = count_query.bind(from);
        }
        if let Some(since) = &filter.since {
            count_query = count_query.bind(since);
        }
        if let Some(pattern) = &like_pattern {
            count_query = count_query.bind(pattern);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        if limit <= 0 {
            return Ok(MessagePage {
                data: Vec::new(),
                total,
            });
        }

        let data_sql = format!(
            "SELECT message_id, from_msisdn, to_msisdn, ts, text
             FROM messages{where_sql}
             ORDER BY ts ASC, message_id ASC
             LIMIT ? OFFSET ?"
        );
        let mut data_query = sqlx::query_as::<_, StoredMessage>(&data_sql);
        if let Some(from) = &filter.from {
            data_query = data_query.bind(from);
        }
        if let Some(since) = &filter.since {
            data_query = data_query.bind(since);
        }
        if let Some(pattern) = &like_pattern {
            data_query = data_query.bind(pattern);
        }
        let data = data_query
            .bind(limit)
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await?;

        Ok(MessagePage { data, total })
    }

    /// Corpus-wide summary, computed over current state at call time.
    ///
    /// `messages_per_sender` holds the top 10 senders by count descending;
    /// equal counts break ties ascending by sender so the listing is
    /// deterministic.
    pub async fn stats(&self) -> Result<StatsSummary, StoreError> {
        let total_messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;

        let senders_count: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT from_msisdn) FROM messages")
                .fetch_one(&self.pool)
                .await?;

        let messages_per_sender = sqlx::query_as::<_, SenderCount>(
            "SELECT from_msisdn, COUNT(*) AS count
             FROM messages
             GROUP BY from_msisdn
             ORDER BY count DESC, from_msisdn ASC
             LIMIT 10",
        )
        .fetch_all(&self.pool)
        .await?;

        let (first_message_ts, last_message_ts): (Option<String>, Option<String>) =
            sqlx::query_as("SELECT MIN(ts), MAX(ts) FROM messages")
                .fetch_one(&self.pool)
                .await?;

        Ok(StatsSummary {
            total_messages,
            senders_count,
            messages_per_sender,
            first_message_ts,
            last_message_ts,
        })
    }
}

/// In-memory store for tests. Single connection: each `sqlite::memory:`
/// connection is its own database.
#[cfg(test)]
pub(crate) async fn memory_store() -> Store {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = Store { pool };
    store.init_schema().await.unwrap();
    store
}
