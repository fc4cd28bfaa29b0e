//! Scan job queue.
//!
//! One active (pending or running) job per scan, enforced by a partial
//! unique index so racing enqueues cannot double-insert. Claiming is a
//! conditional update on `status = 'pending'`; exactly one claimer wins a
//! given row, and losers move on to the next oldest.

use chrono::Utc;
use uuid::Uuid;

use crate::types::{JobStatus, ScanJob};

use super::{parse_ts, parse_uuid, Db, StoreError};

const JOB_COLUMNS: &str = "id, scan_id, status, attempt, created_at, started_at, finished_at, error";

type JobRow = (
    String,         // id
    String,         // scan_id
    String,         // status
    i64,            // attempt
    String,         // created_at
    Option<String>, // started_at
    Option<String>, // finished_at
    Option<String>, // error
);

fn row_to_job(row: JobRow) -> Result<ScanJob, StoreError> {
    let (id, scan_id, status, attempt, created_at, started_at, finished_at, error) = row;
    Ok(ScanJob {
        id: parse_uuid(&id)?,
        scan_id: parse_uuid(&scan_id)?,
        status: status
            .parse::<JobStatus>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        attempt,
        created_at: parse_ts(&created_at)?,
        started_at: started_at.as_deref().map(parse_ts).transpose()?,
        finished_at: finished_at.as_deref().map(parse_ts).transpose()?,
        error,
    })
}

/// What `enqueue` did: either a fresh pending job, or the already-active
/// one for the scan.
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    /// `true` when a new row was inserted.
    pub enqueued: bool,
    /// The active job for the scan.
    pub job: ScanJob,
}

impl Db {
    /// Idempotently enqueue a job for a scan.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub async fn enqueue_job(&self, scan_id: Uuid) -> Result<EnqueueOutcome, StoreError> {
        if let Some(active) = self.active_job_for_scan(scan_id).await? {
            return Ok(EnqueueOutcome {
                enqueued: false,
                job: active,
            });
        }

        let id = Uuid::new_v4();
        let inserted = sqlx::query(
            "INSERT INTO scan_jobs (id, scan_id, status, attempt, created_at)
             VALUES (?1, ?2, 'pending', 0, ?3)",
        )
        .bind(id.to_string())
        .bind(scan_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool())
        .await;

        match inserted {
            Ok(_) => {
                let job = self.get_job(id).await?.ok_or(StoreError::NotFound(id))?;
                Ok(EnqueueOutcome {
                    enqueued: true,
                    job,
                })
            }
            // Lost the race against a concurrent enqueue; the surviving
            // active row is the answer.
            Err(e) if is_unique_violation(&e) => {
                let job = self
                    .active_job_for_scan(scan_id)
                    .await?
                    .ok_or(StoreError::NotFound(scan_id))?;
                Ok(EnqueueOutcome {
                    enqueued: false,
                    job,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The scan's pending or running job, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub async fn active_job_for_scan(&self, scan_id: Uuid) -> Result<Option<ScanJob>, StoreError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM scan_jobs
             WHERE scan_id = ?1 AND status IN ('pending', 'running')
             LIMIT 1"
        ))
        .bind(scan_id.to_string())
        .fetch_optional(self.pool())
        .await?;
        row.map(row_to_job).transpose()
    }

    /// Claim the oldest pending job, or `None` when the queue is empty.
    ///
    /// Loops over candidates: the conditional update means a row another
    /// worker claimed first simply yields zero affected rows here.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub async fn claim_next_job(&self) -> Result<Option<ScanJob>, StoreError> {
        loop {
            let candidate: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM scan_jobs WHERE status = 'pending'
                 ORDER BY created_at ASC, id ASC LIMIT 1",
            )
            .fetch_optional(self.pool())
            .await?;
            let Some((id,)) = candidate else {
                return Ok(None);
            };

            let updated = sqlx::query(
                "UPDATE scan_jobs
                 SET status = 'running', started_at = ?1, attempt = attempt + 1
                 WHERE id = ?2 AND status = 'pending'",
            )
            .bind(Utc::now().to_rfc3339())
            .bind(&id)
            .execute(self.pool())
            .await?;

            if updated.rows_affected() == 1 {
                let job_id = parse_uuid(&id)?;
                return self.get_job(job_id).await;
            }
            // Someone else won this row; try the next oldest.
        }
    }

    /// Record a job's terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown job id.
    pub async fn finalize_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE scan_jobs SET status = ?1, finished_at = ?2, error = ?3 WHERE id = ?4",
        )
        .bind(status.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(error)
        .bind(job_id.to_string())
        .execute(self.pool())
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(job_id));
        }
        Ok(())
    }

    /// Whether any pending job exists, without claiming one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub async fn has_pending_jobs(&self) -> Result<bool, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT id FROM scan_jobs WHERE status = 'pending' LIMIT 1")
                .fetch_optional(self.pool())
                .await?;
        Ok(row.is_some())
    }

    /// Fetch a job by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub async fn get_job(&self, id: Uuid) -> Result<Option<ScanJob>, StoreError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM scan_jobs WHERE id = ?1"
        ))
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await?;
        row.map(row_to_job).transpose()
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db_err)
            if db_err.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}
