//! SQLite-backed persistence for scans, their event timelines, and the job
//! queue.
//!
//! One [`Db`] wraps the pool; the per-table operations live in sibling
//! modules as further `impl Db` blocks. The schema is applied inline from
//! `migrations/001_schema.sql` on open. Timestamps are RFC 3339 TEXT;
//! JSON columns are TEXT serialized at this edge and nowhere else.

use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

pub mod events;
pub mod jobs;
pub mod scans;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Database(String),
    /// Row content could not be decoded into domain types.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(Uuid),
    /// An append kept colliding on the sequence index.
    #[error("event append contention for scan {0}")]
    AppendContention(Uuid),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Handle to the scan database.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open (or create) the database at `url` and apply the schema.
    ///
    /// Accepts a `sqlite:` URL or a bare file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// fails to apply.
    pub async fn open(url: &str) -> anyhow::Result<Self> {
        let options = if url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(url)
                .with_context(|| format!("invalid DATABASE_URL: {url}"))?
        } else {
            SqliteConnectOptions::new().filename(url)
        }
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open scan db at {url}"))?;

        let migration_sql = include_str!("../../migrations/001_schema.sql");
        sqlx::raw_sql(migration_sql)
            .execute(&pool)
            .await
            .context("failed to apply scan schema migration")?;

        Ok(Self { pool })
    }

    /// The underlying pool.
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ── Row helpers shared by the table modules ─────────────────────

/// Parse an RFC 3339 timestamp column.
pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp {s:?}: {e}")))
}

/// Parse a UUID column.
pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Serialization(format!("bad uuid {s:?}: {e}")))
}

/// Parse an optional JSON column.
pub(crate) fn parse_json_opt(s: Option<String>) -> Result<Option<serde_json::Value>, StoreError> {
    match s {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}
