//! Scan row operations.
//!
//! The scan row is the consistency anchor: `queued → running` and
//! `running → complete|failed` are conditional updates on `status`, so
//! exactly one worker ever owns a run and a terminal row is written once.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::types::{Scan, ScanStatus};

use super::{parse_json_opt, parse_ts, parse_uuid, Db, StoreError};

/// Column list shared by every scan SELECT.
const SCAN_COLUMNS: &str = "id, chain, token_address, status, created_at, duration_ms, \
     scanner_version, score_version, evidence, assessment, narrative, model_id, error";

type ScanRow = (
    String,         // id
    String,         // chain
    String,         // token_address
    String,         // status
    String,         // created_at
    Option<i64>,    // duration_ms
    String,         // scanner_version
    String,         // score_version
    Option<String>, // evidence
    Option<String>, // assessment
    Option<String>, // narrative
    Option<String>, // model_id
    Option<String>, // error
);

fn row_to_scan(row: ScanRow) -> Result<Scan, StoreError> {
    let (
        id,
        chain,
        token_address,
        status,
        created_at,
        duration_ms,
        scanner_version,
        score_version,
        evidence,
        assessment,
        narrative,
        model_id,
        error,
    ) = row;
    Ok(Scan {
        id: parse_uuid(&id)?,
        chain,
        token_address,
        status: status
            .parse::<ScanStatus>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        created_at: parse_ts(&created_at)?,
        duration_ms,
        scanner_version,
        score_version,
        evidence: parse_json_opt(evidence)?,
        assessment: parse_json_opt(assessment)?,
        narrative,
        model_id,
        error,
    })
}

impl Db {
    /// Insert a fresh `queued` scan row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub async fn insert_queued_scan(
        &self,
        id: Uuid,
        chain: &str,
        token_address: &str,
        scanner_version: &str,
        score_version: &str,
    ) -> Result<Scan, StoreError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO scans (id, chain, token_address, status, created_at, scanner_version, score_version)
             VALUES (?1, ?2, ?3, 'queued', ?4, ?5, ?6)",
        )
        .bind(id.to_string())
        .bind(chain)
        .bind(token_address)
        .bind(now.to_rfc3339())
        .bind(scanner_version)
        .bind(score_version)
        .execute(self.pool())
        .await?;

        self.get_scan(id).await?.ok_or(StoreError::NotFound(id))
    }

    /// Fetch a scan by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure or row corruption.
    pub async fn get_scan(&self, id: Uuid) -> Result<Option<Scan>, StoreError> {
        let row: Option<ScanRow> = sqlx::query_as(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await?;
        row.map(row_to_scan).transpose()
    }

    /// Compare-and-swap `queued → running`. Returns the claimed row, or
    /// `None` when someone else already owns it (or it is terminal).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub async fn claim_scan_for_run(&self, id: Uuid) -> Result<Option<Scan>, StoreError> {
        let updated = sqlx::query(
            "UPDATE scans SET status = 'running' WHERE id = ?1 AND status = 'queued'",
        )
        .bind(id.to_string())
        .execute(self.pool())
        .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_scan(id).await
    }

    /// Terminal transition `running → complete` with the final artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the scan is not currently
    /// running (the CAS failed).
    pub async fn complete_scan(
        &self,
        id: Uuid,
        duration_ms: i64,
        evidence: &Value,
        assessment: &Value,
        narrative: &str,
        model_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE scans SET status = 'complete', duration_ms = ?1, evidence = ?2,
                    assessment = ?3, narrative = ?4, model_id = ?5, error = NULL
             WHERE id = ?6 AND status = 'running'",
        )
        .bind(duration_ms)
        .bind(serde_json::to_string(evidence)?)
        .bind(serde_json::to_string(assessment)?)
        .bind(narrative)
        .bind(model_id)
        .bind(id.to_string())
        .execute(self.pool())
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Terminal transition to `failed`, keeping whatever partial evidence
    /// was collected for postmortem.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the scan is already terminal.
    pub async fn fail_scan(
        &self,
        id: Uuid,
        duration_ms: i64,
        evidence: Option<&Value>,
        error: &str,
    ) -> Result<(), StoreError> {
        let evidence_text = evidence.map(serde_json::to_string).transpose()?;
        let updated = sqlx::query(
            "UPDATE scans SET status = 'failed', duration_ms = ?1, evidence = ?2, error = ?3
             WHERE id = ?4 AND status IN ('queued', 'running')",
        )
        .bind(duration_ms)
        .bind(evidence_text)
        .bind(error)
        .bind(id.to_string())
        .execute(self.pool())
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// The most recent `complete` scan for a token, for the create-scan
    /// cache path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub async fn latest_complete_scan(
        &self,
        chain: &str,
        token_address: &str,
    ) -> Result<Option<Scan>, StoreError> {
        let row: Option<ScanRow> = sqlx::query_as(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans
             WHERE chain = ?1 AND token_address = ?2 AND status = 'complete'
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(chain)
        .bind(token_address)
        .fetch_optional(self.pool())
        .await?;
        row.map(row_to_scan).transpose()
    }

    /// Delete a scan; events and jobs cascade.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub async fn delete_scan(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM scans WHERE id = ?1")
            .bind(id.to_string())
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
