//! The pipeline runner: claim, plan, execute, assess, persist.
//!
//! One call to [`ScanRunner::run_scan`] drives a claimed scan from
//! `running` to a terminal state, emitting the event timeline at every
//! edge. Provider failures degrade individual steps to warnings; only a
//! failed bytecode check (the address is not a contract) or an internal
//! error terminates the run. On the failure branch the scan row is
//! committed *before* `run.failed` is emitted, so a subscriber that sees
//! the terminal event always observes the terminal row.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::bridge::{assessor, Analyst};
use crate::evidence::{EvidenceLedger, ToolName};
use crate::store::{Db, StoreError};
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{EventLevel, PlannedStep, Scan};

pub mod plan;

/// Step key for the address-validation phase.
pub const STEP_VALIDATE: &str = "validate_target";
/// Step key for the planning phase.
pub const STEP_PLAN: &str = "agent_plan";
/// Step key for the assessment phase.
pub const STEP_ASSESS: &str = "agent_assessment";

/// Message recorded when the target turns out not to be a contract.
pub const NOT_A_CONTRACT_MESSAGE: &str = "Address does not contain contract bytecode on Base";

/// Version of the scoring scheme persisted on every scan row.
pub const SCORE_VERSION: &str = "1";

/// Errors that escape the runner (persistence only; pipeline problems are
/// handled on the failure branch).
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The store failed while recording the run.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a claimed run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Scan persisted as `complete`.
    Completed,
    /// Scan persisted as `failed`.
    Failed {
        /// The recorded error message.
        error: String,
    },
}

/// A mid-pipeline failure, carried to the failure branch.
struct PipelineFailure {
    step_key: Option<String>,
    message: String,
    step_failed_emitted: bool,
}

impl From<StoreError> for PipelineFailure {
    fn from(e: StoreError) -> Self {
        PipelineFailure {
            step_key: None,
            message: format!("internal error: {e}"),
            step_failed_emitted: false,
        }
    }
}

/// Drives scans through the investigation pipeline.
pub struct ScanRunner {
    db: Arc<Db>,
    registry: Arc<ToolRegistry>,
    analyst: Option<Arc<dyn Analyst>>,
}

impl ScanRunner {
    /// Create a runner. `analyst` is `None` when no LLM is configured; the
    /// pipeline then always uses the baseline plan and the deterministic
    /// fallback assessment.
    pub fn new(
        db: Arc<Db>,
        registry: Arc<ToolRegistry>,
        analyst: Option<Arc<dyn Analyst>>,
    ) -> Self {
        Self {
            db,
            registry,
            analyst,
        }
    }

    /// Run one claimed scan to a terminal state.
    ///
    /// Returns `None` when the claim was lost (scan already running or
    /// terminal) — callers record the job as skipped.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] only when the terminal persistence itself
    /// fails; every pipeline-level problem ends in a persisted `failed`
    /// scan instead.
    pub async fn run_scan(&self, scan_id: Uuid) -> Result<Option<ScanOutcome>, RunnerError> {
        let Some(scan) = self.db.claim_scan_for_run(scan_id).await? else {
            info!(scan_id = %scan_id, "scan not claimable, skipping");
            return Ok(None);
        };

        let started = Instant::now();
        let mut ledger = EvidenceLedger::new();

        match self.run_pipeline(&scan, &mut ledger).await {
            Ok(()) => {
                info!(scan_id = %scan_id, duration_ms = elapsed_ms(&started), "scan complete");
                Ok(Some(ScanOutcome::Completed))
            }
            Err(failure) => {
                let duration_ms = elapsed_ms(&started);
                let evidence = serde_json::to_value(&ledger).ok();
                // Persist the terminal row first, then tell subscribers.
                self.db
                    .fail_scan(scan.id, duration_ms, evidence.as_ref(), &failure.message)
                    .await?;
                if !failure.step_failed_emitted {
                    self.emit(
                        scan.id,
                        EventLevel::Error,
                        "step.failed",
                        failure.step_key.as_deref(),
                        &failure.message,
                        None,
                    )
                    .await;
                }
                self.emit(
                    scan.id,
                    EventLevel::Error,
                    "run.failed",
                    None,
                    &failure.message,
                    None,
                )
                .await;
                warn!(scan_id = %scan_id, error = %failure.message, "scan failed");
                Ok(Some(ScanOutcome::Failed {
                    error: failure.message,
                }))
            }
        }
    }

    async fn run_pipeline(
        &self,
        scan: &Scan,
        ledger: &mut EvidenceLedger,
    ) -> Result<(), PipelineFailure> {
        let scan_id = scan.id;
        let address = scan.token_address.as_str();
        let started = Instant::now();

        self.emit(scan_id, EventLevel::Info, "run.started", None, "Scan started", None)
            .await;

        // The address was validated at creation; this step exists so the
        // timeline shows it.
        self.emit(
            scan_id,
            EventLevel::Info,
            "step.started",
            Some(STEP_VALIDATE),
            "Validating target address",
            None,
        )
        .await;
        self.emit(
            scan_id,
            EventLevel::Success,
            "step.completed",
            Some(STEP_VALIDATE),
            "Target address is well-formed",
            None,
        )
        .await;

        // ── Plan ────────────────────────────────────────────────
        self.emit(
            scan_id,
            EventLevel::Info,
            "step.started",
            Some(STEP_PLAN),
            "Planning the investigation",
            None,
        )
        .await;

        let available = self.registry.available();
        let baseline = plan::baseline_plan(&available);

        let planned = match &self.analyst {
            Some(analyst) => analyst.plan(address, &available).await,
            None => Err(crate::providers::llm::LlmError::NoOutput(
                "LLM not configured".to_string(),
            )),
        };

        let merged = match planned {
            Ok(proposal) => {
                let merged = plan::merge_plan(&baseline, &proposal.steps, &available);
                self.emit(
                    scan_id,
                    EventLevel::Info,
                    "artifact.plan",
                    Some(STEP_PLAN),
                    "Investigation plan ready",
                    Some(&serde_json::json!({
                        "steps": &merged,
                        "fallback": false,
                        "modelId": proposal.model_id,
                    })),
                )
                .await;
                self.emit(
                    scan_id,
                    EventLevel::Success,
                    "step.completed",
                    Some(STEP_PLAN),
                    "Plan ready",
                    None,
                )
                .await;
                merged
            }
            Err(e) => {
                self.emit(
                    scan_id,
                    EventLevel::Warning,
                    "log.line",
                    Some(STEP_PLAN),
                    &format!("Planner unavailable, using baseline plan: {e}"),
                    None,
                )
                .await;
                self.emit(
                    scan_id,
                    EventLevel::Warning,
                    "artifact.plan",
                    Some(STEP_PLAN),
                    "Baseline plan substituted",
                    Some(&serde_json::json!({
                        "steps": &baseline,
                        "fallback": true,
                    })),
                )
                .await;
                self.emit(
                    scan_id,
                    EventLevel::Warning,
                    "step.completed",
                    Some(STEP_PLAN),
                    "Plan ready (baseline)",
                    None,
                )
                .await;
                baseline
            }
        };

        // ── Execute steps ───────────────────────────────────────
        for step in &merged {
            self.execute_step(scan_id, address, step, ledger).await?;
        }

        // ── Assess ──────────────────────────────────────────────
        self.emit(
            scan_id,
            EventLevel::Info,
            "step.started",
            Some(STEP_ASSESS),
            "Generating assessment",
            None,
        )
        .await;

        let assessed = match &self.analyst {
            Some(analyst) => analyst.assess(address, ledger).await,
            None => Err(crate::providers::llm::LlmError::NoOutput(
                "LLM not configured".to_string(),
            )),
        };

        let (assessment, model_id, used_fallback) = match assessed {
            Ok(outcome) => (outcome.assessment, Some(outcome.model_id), false),
            Err(e) => {
                self.emit(
                    scan_id,
                    EventLevel::Warning,
                    "log.line",
                    Some(STEP_ASSESS),
                    &format!("Assessor unavailable, using deterministic fallback: {e}"),
                    None,
                )
                .await;
                (assessor::fallback_assessment(ledger), None, true)
            }
        };

        // Persist the completed scan before announcing the result.
        let duration_ms = elapsed_ms(&started);
        let evidence_json = serde_json::to_value(&*ledger)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let assessment_json = serde_json::to_value(&assessment)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.db
            .complete_scan(
                scan_id,
                duration_ms,
                &evidence_json,
                &assessment_json,
                &assessment.summary,
                model_id.as_deref(),
            )
            .await?;

        self.emit(
            scan_id,
            EventLevel::Success,
            "assessment.final",
            Some(STEP_ASSESS),
            "Assessment ready",
            Some(&serde_json::json!({
                "assessment": assessment,
                "modelId": model_id,
                "fallback": used_fallback,
            })),
        )
        .await;
        self.emit(
            scan_id,
            EventLevel::Success,
            "step.completed",
            Some(STEP_ASSESS),
            "Assessment complete",
            None,
        )
        .await;
        self.emit(
            scan_id,
            EventLevel::Success,
            "run.completed",
            None,
            "Scan complete",
            None,
        )
        .await;

        Ok(())
    }

    async fn execute_step(
        &self,
        scan_id: Uuid,
        address: &str,
        step: &PlannedStep,
        ledger: &mut EvidenceLedger,
    ) -> Result<(), PipelineFailure> {
        self.emit(
            scan_id,
            EventLevel::Info,
            "step.started",
            Some(step.step_key.as_str()),
            &step.title,
            Some(&serde_json::json!({
                "tool": step.tool,
                "reason": &step.reason,
            })),
        )
        .await;

        let item = match self.registry.get(step.tool) {
            Some(executor) => {
                let ctx = ToolContext {
                    token_address: address,
                    ledger,
                };
                executor.execute(&ctx).await
            }
            None => crate::evidence::EvidenceItem::unavailable(
                step.tool,
                step.title.clone(),
                None,
                "tool not registered under current configuration",
            ),
        };

        let ok = item.is_ok();
        let item_payload = serde_json::to_value(&item).unwrap_or_else(|_| serde_json::json!({}));
        ledger.push(item.clone());

        self.emit(
            scan_id,
            if ok {
                EventLevel::Info
            } else {
                EventLevel::Warning
            },
            "evidence.item",
            Some(step.step_key.as_str()),
            &item.title,
            Some(&item_payload),
        )
        .await;
        self.emit(
            scan_id,
            if ok {
                EventLevel::Info
            } else {
                EventLevel::Warning
            },
            "log.line",
            Some(step.step_key.as_str()),
            &format!(
                "{} -> {}",
                step.tool,
                if ok { "ok" } else { "unavailable" }
            ),
            None,
        )
        .await;

        // A confirmed non-contract address invalidates the whole scan.
        if step.tool == ToolName::RpcGetBytecode
            && item.data.get("hasCode").and_then(|v| v.as_bool()) == Some(false)
        {
            self.emit(
                scan_id,
                EventLevel::Error,
                "step.failed",
                Some(step.step_key.as_str()),
                NOT_A_CONTRACT_MESSAGE,
                None,
            )
            .await;
            return Err(PipelineFailure {
                step_key: Some(step.step_key.clone()),
                message: NOT_A_CONTRACT_MESSAGE.to_string(),
                step_failed_emitted: true,
            });
        }

        self.emit(
            scan_id,
            if ok {
                EventLevel::Success
            } else {
                EventLevel::Warning
            },
            "step.completed",
            Some(step.step_key.as_str()),
            &format!("{} finished", step.title),
            None,
        )
        .await;

        Ok(())
    }

    /// Append an event; failures are logged and swallowed so a hiccup in
    /// the timeline never kills a run mid-flight.
    async fn emit(
        &self,
        scan_id: Uuid,
        level: EventLevel,
        event_type: &str,
        step_key: Option<&str>,
        message: &str,
        payload: Option<&serde_json::Value>,
    ) {
        if let Err(e) = self
            .db
            .append_event(scan_id, level, event_type, step_key, message, payload)
            .await
        {
            warn!(scan_id = %scan_id, event_type, error = %e, "failed to append scan event");
        }
    }
}

fn elapsed_ms(started: &Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}
