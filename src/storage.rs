//! SQLite storage layer for cert-expiry.
//!
//! Two tables:
//!
//! - `activity_events`: the local activity index, one row per receipt signed
//!   by an account (`ts_nanos` is the block timestamp in nanoseconds)
//! - `certificates`: issuance records, write-once per `token_id`
//!
//! `Storage` doubles as an [`ActivityDataSource`] so a deployment without a
//! remote indexer can compute expirations from the local index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::data_sources::ActivityDataSource;
use crate::error::DataSourceError;
use crate::model::{ActivityEvent, IssuanceRecord};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:cert-expiry.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Each connection to `sqlite::memory:` is its own database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS activity_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id TEXT NOT NULL,
                ts_nanos INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Index for range scans by account
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_activity_events_account_ts
            ON activity_events(account_id, ts_nanos)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS certificates (
                token_id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                issued_at_ms INTEGER NOT NULL,
                title TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record one activity event for an account.
    pub async fn insert_activity(
        &self,
        account_id: &str,
        event: &ActivityEvent,
    ) -> anyhow::Result<()> {
        let ts = event
            .nanos()
            .ok_or_else(|| anyhow::anyhow!("{} is out of nanosecond range", event.timestamp))?;

        sqlx::query(
            r#"
            INSERT INTO activity_events (account_id, ts_nanos)
            VALUES (?, ?)
            "#,
        )
        .bind(account_id)
        .bind(ts)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of indexed events for an account.
    pub async fn activity_count(&self, account_id: &str) -> anyhow::Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as total
            FROM activity_events
            WHERE account_id = ?
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("total"))
    }

    /// Activity of an account in `[since, until)`, oldest first.
    ///
    /// Bounds outside the nanosecond range are clamped; no stored event can
    /// lie beyond them.
    pub async fn query_activity(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, DataSourceError> {
        let since_ts = since.timestamp_nanos_opt().unwrap_or(i64::MIN);
        let until_ts = until.timestamp_nanos_opt().unwrap_or(i64::MAX);

        let rows = sqlx::query(
            r#"
            SELECT ts_nanos
            FROM activity_events
            WHERE account_id = ? AND ts_nanos >= ? AND ts_nanos < ?
            ORDER BY ts_nanos ASC
            "#,
        )
        .bind(account_id)
        .bind(since_ts)
        .bind(until_ts)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| ActivityEvent::from_nanos(r.get("ts_nanos")))
            .collect())
    }

    /// Store an issuance record.
    ///
    /// Returns `false` without touching the stored row if `token_id` already
    /// exists.
    pub async fn insert_certificate(&self, record: &IssuanceRecord) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO certificates (token_id, account_id, issued_at_ms, title)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(token_id) DO NOTHING
            "#,
        )
        .bind(&record.token_id)
        .bind(&record.account_id)
        .bind(record.issued_at.timestamp_millis())
        .bind(&record.title)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_certificate(&self, token_id: &str) -> anyhow::Result<Option<IssuanceRecord>> {
        let row = sqlx::query(
            r#"
            SELECT token_id, account_id, issued_at_ms, title
            FROM certificates
            WHERE token_id = ?
            "#,
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let issued_at_ms: i64 = row.get("issued_at_ms");
        let issued_at = DateTime::from_timestamp_millis(issued_at_ms)
            .ok_or_else(|| anyhow::anyhow!("stored issued_at {issued_at_ms} is out of range"))?;

        Ok(Some(IssuanceRecord {
            token_id: row.get("token_id"),
            account_id: row.get("account_id"),
            issued_at,
            title: row.get("title"),
        }))
    }
}

#[async_trait]
impl ActivityDataSource for Storage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn fetch_activity(
        &self,
        account_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, DataSourceError> {
        self.query_activity(account_id, since, until).await
    }
}
