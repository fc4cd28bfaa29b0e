//! Process-local scan worker.
//!
//! A singleton owned by the app state. `trigger()` is fire-and-forget: it
//! spawns the drain loop onto the runtime unless one is already running.
//! The loop claims jobs until the pending queue is empty, runs each scan,
//! finalizes its job, and exits — the next enqueue triggers a fresh loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use crate::runner::{ScanOutcome, ScanRunner};
use crate::store::Db;
use crate::types::JobStatus;

/// The scan worker singleton.
pub struct Worker {
    db: Arc<Db>,
    runner: Arc<ScanRunner>,
    running: AtomicBool,
}

impl Worker {
    /// Create the worker.
    pub fn new(db: Arc<Db>, runner: Arc<ScanRunner>) -> Arc<Self> {
        Arc::new(Self {
            db,
            runner,
            running: AtomicBool::new(false),
        })
    }

    /// Launch the drain loop if it is not already running. Callers do not
    /// await the work.
    pub fn trigger(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            worker.drain().await;
        });
    }

    /// Claim-and-run until the pending queue is empty.
    ///
    /// After clearing the run flag, the queue is checked once more: an
    /// enqueue that raced the shutdown would otherwise sit unserved until
    /// the next trigger.
    async fn drain(self: Arc<Self>) {
        loop {
            loop {
                let job = match self.db.claim_next_job().await {
                    Ok(Some(job)) => job,
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "worker failed to claim a job");
                        self.running.store(false, Ordering::Release);
                        return;
                    }
                };

                info!(job_id = %job.id, scan_id = %job.scan_id, attempt = job.attempt, "job claimed");
                let (status, error) = match self.runner.run_scan(job.scan_id).await {
                    Ok(Some(ScanOutcome::Completed)) => (JobStatus::Completed, None),
                    // The scan failed but the job did its work: the
                    // terminal state and error live on the scan row.
                    Ok(Some(ScanOutcome::Failed { error })) => {
                        (JobStatus::Completed, Some(error))
                    }
                    Ok(None) => (JobStatus::Skipped, None),
                    Err(e) => (JobStatus::Failed, Some(e.to_string())),
                };

                if let Err(e) = self
                    .db
                    .finalize_job(job.id, status, error.as_deref())
                    .await
                {
                    error!(job_id = %job.id, error = %e, "failed to finalize job");
                }
            }

            self.running.store(false, Ordering::Release);

            // Close the enqueue/shutdown race: if new work arrived while
            // we were shutting down, take the flag back and keep going.
            let has_pending = matches!(self.db.has_pending_jobs().await, Ok(true));
            if !has_pending || self.running.swap(true, Ordering::AcqRel) {
                break;
            }
        }
    }
}
