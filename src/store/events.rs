//! Append-only event timeline.
//!
//! `seq` is allocated as `max(seq) + 1` per scan inside the insert itself;
//! concurrent appenders collide on the `(scan_id, seq)` unique index and
//! retry with a fresh read. That serializes appends without advisory locks
//! and stays correct with multiple worker processes on the same file.

use chrono::Utc;
use uuid::Uuid;

use crate::types::{EventLevel, ScanEvent};

use super::{parse_ts, parse_uuid, Db, StoreError};

/// Bounded retry for seq-index collisions.
const APPEND_MAX_ATTEMPTS: u32 = 8;

const EVENT_COLUMNS: &str = "id, scan_id, seq, ts, level, event_type, step_key, message, payload";

type EventRow = (
    i64,            // id
    String,         // scan_id
    i64,            // seq
    String,         // ts
    String,         // level
    String,         // event_type
    Option<String>, // step_key
    String,         // message
    Option<String>, // payload
);

fn row_to_event(row: EventRow) -> Result<ScanEvent, StoreError> {
    let (id, scan_id, seq, ts, level, event_type, step_key, message, payload) = row;
    Ok(ScanEvent {
        id,
        scan_id: parse_uuid(&scan_id)?,
        seq,
        ts: parse_ts(&ts)?,
        level: level
            .parse::<EventLevel>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        event_type,
        step_key,
        message,
        payload: payload
            .map(|text| serde_json::from_str(&text))
            .transpose()?,
    })
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db_err)
            if db_err.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}

impl Db {
    /// Append one event to a scan's timeline and return the stored row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AppendContention`] after exhausting retries,
    /// or [`StoreError`] on other database failures.
    pub async fn append_event(
        &self,
        scan_id: Uuid,
        level: EventLevel,
        event_type: &str,
        step_key: Option<&str>,
        message: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<ScanEvent, StoreError> {
        let payload_text = payload.map(serde_json::to_string).transpose()?;

        for _ in 0..APPEND_MAX_ATTEMPTS {
            let max_seq: Option<i64> =
                sqlx::query_scalar("SELECT MAX(seq) FROM scan_events WHERE scan_id = ?1")
                    .bind(scan_id.to_string())
                    .fetch_one(self.pool())
                    .await?;
            let seq = max_seq.unwrap_or(0).saturating_add(1);
            let ts = Utc::now().to_rfc3339();

            let inserted: Result<(i64,), sqlx::Error> = sqlx::query_as(
                "INSERT INTO scan_events (scan_id, seq, ts, level, event_type, step_key, message, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 RETURNING id",
            )
            .bind(scan_id.to_string())
            .bind(seq)
            .bind(&ts)
            .bind(level.to_string())
            .bind(event_type)
            .bind(step_key)
            .bind(message)
            .bind(payload_text.as_deref())
            .fetch_one(self.pool())
            .await;

            match inserted {
                Ok((id,)) => {
                    return Ok(ScanEvent {
                        id,
                        scan_id,
                        seq,
                        ts: parse_ts(&ts)?,
                        level,
                        event_type: event_type.to_string(),
                        step_key: step_key.map(str::to_string),
                        message: message.to_string(),
                        payload: payload.cloned(),
                    });
                }
                Err(e) if is_unique_violation(&e) => {
                    tracing::debug!(scan_id = %scan_id, seq, "event seq collision, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::AppendContention(scan_id))
    }

    /// Full ordered timeline for a scan.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub async fn list_events(&self, scan_id: Uuid) -> Result<Vec<ScanEvent>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM scan_events WHERE scan_id = ?1 ORDER BY id ASC"
        ))
        .bind(scan_id.to_string())
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(row_to_event).collect()
    }

    /// Events with a global id strictly greater than `after_id`, in id
    /// order — the stream fan-out's cursor read.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub async fn list_events_after(
        &self,
        scan_id: Uuid,
        after_id: i64,
    ) -> Result<Vec<ScanEvent>, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM scan_events
             WHERE scan_id = ?1 AND id > ?2 ORDER BY id ASC"
        ))
        .bind(scan_id.to_string())
        .bind(after_id)
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(row_to_event).collect()
    }

    /// The most recent event for a scan, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub async fn latest_event(&self, scan_id: Uuid) -> Result<Option<ScanEvent>, StoreError> {
        let row: Option<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM scan_events
             WHERE scan_id = ?1 ORDER BY id DESC LIMIT 1"
        ))
        .bind(scan_id.to_string())
        .fetch_optional(self.pool())
        .await?;
        row.map(row_to_event).transpose()
    }
}
