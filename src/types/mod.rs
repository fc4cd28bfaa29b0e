// Core domain types: scans, jobs, events, plans, and assessments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evidence::ToolName;

// ── Scan ────────────────────────────────────────────────────────

/// Lifecycle status of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Inserted, waiting for a worker to claim it.
    Queued,
    /// Claimed by a worker; pipeline in progress.
    Running,
    /// Pipeline finished with a persisted assessment.
    Complete,
    /// Pipeline aborted; `error` explains why.
    Failed,
    /// Canceled before completion.
    Canceled,
}

impl ScanStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Running => f.write_str("running"),
            Self::Complete => f.write_str("complete"),
            Self::Failed => f.write_str("failed"),
            Self::Canceled => f.write_str("canceled"),
        }
    }
}

impl std::str::FromStr for ScanStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(anyhow::anyhow!("unknown scan status: {other}")),
        }
    }
}

/// A persisted scan row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    /// Scan UUID.
    pub id: Uuid,
    /// Network tag (always `base`).
    pub chain: String,
    /// Lowercase token contract address.
    pub token_address: String,
    /// Current lifecycle status.
    pub status: ScanStatus,
    /// When the scan row was created.
    pub created_at: DateTime<Utc>,
    /// Wall-clock duration of the run, set at terminal transition.
    pub duration_ms: Option<i64>,
    /// Version of the scanner binary that produced this row.
    pub scanner_version: String,
    /// Version of the scoring scheme.
    pub score_version: String,
    /// Final evidence ledger as JSON (set on completion or partial on failure).
    pub evidence: Option<serde_json::Value>,
    /// Final assessment as JSON.
    pub assessment: Option<serde_json::Value>,
    /// Human-readable summary of the assessment.
    pub narrative: Option<String>,
    /// Model id that produced the assessment, if any.
    pub model_id: Option<String>,
    /// Error message for failed scans.
    pub error: Option<String>,
}

// ── Jobs ────────────────────────────────────────────────────────

/// Lifecycle status of a queued scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by exactly one worker.
    Running,
    /// Ran to completion (the scan itself may still have failed).
    Completed,
    /// The runner returned an error.
    Failed,
    /// Claimed but skipped (scan was already running or terminal).
    Skipped,
}

impl JobStatus {
    /// Whether the job can still be claimed or is in flight.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running => f.write_str("running"),
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
            Self::Skipped => f.write_str("skipped"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(anyhow::anyhow!("unknown job status: {other}")),
        }
    }
}

/// A persisted scan job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJob {
    /// Job UUID.
    pub id: Uuid,
    /// Owning scan.
    pub scan_id: Uuid,
    /// Current status.
    pub status: JobStatus,
    /// How many times this job has been claimed.
    pub attempt: i64,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// When a worker claimed it.
    pub started_at: Option<DateTime<Utc>>,
    /// When it reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Error message for failed jobs.
    pub error: Option<String>,
}

// ── Events ──────────────────────────────────────────────────────

/// Severity of a timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for EventLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Success => f.write_str("success"),
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

impl std::str::FromStr for EventLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "success" => Ok(Self::Success),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(anyhow::anyhow!("unknown event level: {other}")),
        }
    }
}

/// One immutable entry in a scan's append-only timeline.
///
/// `seq` is unique per scan and contiguous from 1; `id` is globally
/// monotonic across scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    /// Global monotonic id.
    pub id: i64,
    /// Owning scan.
    pub scan_id: Uuid,
    /// Per-scan sequence number, contiguous from 1.
    pub seq: i64,
    /// Append timestamp.
    pub ts: DateTime<Utc>,
    /// Severity.
    pub level: EventLevel,
    /// Dotted event type, e.g. `step.completed`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Pipeline step this event belongs to, if any.
    pub step_key: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Structured payload (plan artifacts, evidence items, assessments).
    pub payload: Option<serde_json::Value>,
}

// ── Plans ───────────────────────────────────────────────────────

/// One step of an execution plan: a tool to run, plus presentation strings
/// used by step-level events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStep {
    /// Stable step identifier used by step-level events.
    pub step_key: String,
    /// Tool to execute.
    pub tool: ToolName,
    /// Short display title.
    pub title: String,
    /// Why this step is in the plan.
    pub reason: String,
}

impl PlannedStep {
    /// The stable step key for a tool. Step keys are what the UI and the
    /// event stream identify steps by, so they never change.
    pub fn canonical_key(tool: ToolName) -> &'static str {
        match tool {
            ToolName::RpcGetBytecode => "rpc_bytecode",
            ToolName::RpcGetErc20Metadata => "erc20_metadata",
            ToolName::DexscreenerGetPairs => "dex_pairs",
            ToolName::HoneypotGetSimulation => "honeypot_sim",
            ToolName::LpV2LockStatus => "lp_lock",
            ToolName::BasescanGetSourceInfo => "source_info",
            ToolName::BasescanGetContractCreation => "contract_creation",
            ToolName::ContractOwnerStatus => "owner_status",
            ToolName::ContractCapabilityScan => "capability_scan",
            ToolName::HoldersGetTopHolders => "top_holders",
        }
    }

    /// Display title for a tool's step.
    pub fn canonical_title(tool: ToolName) -> &'static str {
        match tool {
            ToolName::RpcGetBytecode => "Verify contract bytecode",
            ToolName::RpcGetErc20Metadata => "Read ERC-20 metadata",
            ToolName::DexscreenerGetPairs => "Fetch DEX trading pairs",
            ToolName::HoneypotGetSimulation => "Simulate buy and sell",
            ToolName::LpV2LockStatus => "Check LP lock status",
            ToolName::BasescanGetSourceInfo => "Fetch verified source & ABI",
            ToolName::BasescanGetContractCreation => "Look up contract deployer",
            ToolName::ContractOwnerStatus => "Check owner status",
            ToolName::ContractCapabilityScan => "Scan ABI capabilities",
            ToolName::HoldersGetTopHolders => "Fetch top holders",
        }
    }

    /// Default reason used when the step comes from the baseline plan
    /// rather than the planner.
    pub fn default_reason(tool: ToolName) -> &'static str {
        match tool {
            ToolName::RpcGetBytecode => "Confirm the address is a deployed contract",
            ToolName::RpcGetErc20Metadata => "Identify the token and its supply",
            ToolName::DexscreenerGetPairs => "Measure market depth and activity",
            ToolName::HoneypotGetSimulation => "Verify holders can actually sell",
            ToolName::LpV2LockStatus => "Determine whether liquidity can be pulled",
            ToolName::BasescanGetSourceInfo => "Check source verification and proxy usage",
            ToolName::BasescanGetContractCreation => "Identify the deployer wallet",
            ToolName::ContractOwnerStatus => "Check whether ownership is renounced",
            ToolName::ContractCapabilityScan => "Look for mint, pause, and fee switches",
            ToolName::HoldersGetTopHolders => "Measure supply concentration",
        }
    }

    /// Build the canonical step for a tool with the default reason.
    pub fn canonical(tool: ToolName) -> Self {
        Self::with_reason(tool, Self::default_reason(tool).to_string())
    }

    /// Build the canonical step for a tool with a custom reason (from the
    /// planner).
    pub fn with_reason(tool: ToolName, reason: String) -> Self {
        Self {
            step_key: Self::canonical_key(tool).to_string(),
            tool,
            title: Self::canonical_title(tool).to_string(),
            reason,
        }
    }
}

// ── Assessment ──────────────────────────────────────────────────

/// Overall risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Assessor confidence in its own output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

/// The five fixed scoring categories, each 0-100 (higher is safer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScores {
    pub contract_security: u8,
    pub liquidity: u8,
    pub holder_distribution: u8,
    pub market_activity: u8,
    pub transparency: u8,
}

/// One reason backing the assessment, with citations into the evidence
/// ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentReason {
    /// Short headline.
    pub title: String,
    /// Full explanation.
    pub detail: String,
    /// Evidence item ids this reason is grounded on. Never empty in a
    /// validated assessment.
    pub evidence_refs: Vec<String>,
}

/// The final structured verdict for a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    /// Narrative summary. Non-empty.
    pub summary: String,
    /// Overall risk score, 0 (safe) to 100 (avoid).
    pub overall_score: u8,
    /// Risk classification.
    pub risk_level: RiskLevel,
    /// Assessor confidence.
    pub confidence: ConfidenceLevel,
    /// Per-category scores.
    pub category_scores: CategoryScores,
    /// Cited reasons, at least one.
    pub reasons: Vec<AssessmentReason>,
    /// What could not be determined and why.
    pub missing_data: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_status_roundtrip() {
        for status in [
            ScanStatus::Queued,
            ScanStatus::Running,
            ScanStatus::Complete,
            ScanStatus::Failed,
            ScanStatus::Canceled,
        ] {
            let s = status.to_string();
            let parsed: ScanStatus = s.parse().expect("roundtrip should work");
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_scan_status_terminal() {
        assert!(!ScanStatus::Queued.is_terminal());
        assert!(!ScanStatus::Running.is_terminal());
        assert!(ScanStatus::Complete.is_terminal());
        assert!(ScanStatus::Failed.is_terminal());
        assert!(ScanStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_job_status_active() {
        assert!(JobStatus::Pending.is_active());
        assert!(JobStatus::Running.is_active());
        assert!(!JobStatus::Completed.is_active());
        assert!(!JobStatus::Failed.is_active());
        assert!(!JobStatus::Skipped.is_active());
    }

    #[test]
    fn test_event_level_from_str_invalid() {
        assert!("fatal".parse::<EventLevel>().is_err());
        assert!("".parse::<EventLevel>().is_err());
    }

    #[test]
    fn test_assessment_serializes_camel_case() {
        let assessment = Assessment {
            summary: "ok".to_string(),
            overall_score: 22,
            risk_level: RiskLevel::Low,
            confidence: ConfidenceLevel::High,
            category_scores: CategoryScores {
                contract_security: 80,
                liquidity: 75,
                holder_distribution: 70,
                market_activity: 65,
                transparency: 90,
            },
            reasons: vec![AssessmentReason {
                title: "LP burned".to_string(),
                detail: "97% of pair supply burned".to_string(),
                evidence_refs: vec!["ev_lp_deadbeef".to_string()],
            }],
            missing_data: vec![],
        };
        let json = serde_json::to_value(&assessment).expect("serialize");
        assert_eq!(json["overallScore"], 22);
        assert_eq!(json["riskLevel"], "low");
        assert_eq!(json["categoryScores"]["contractSecurity"], 80);
        assert_eq!(json["reasons"][0]["evidenceRefs"][0], "ev_lp_deadbeef");
    }

    #[test]
    fn test_event_type_field_renamed() {
        let event = ScanEvent {
            id: 7,
            scan_id: Uuid::new_v4(),
            seq: 1,
            ts: Utc::now(),
            level: EventLevel::Info,
            event_type: "run.started".to_string(),
            step_key: None,
            message: "Scan started".to_string(),
            payload: None,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "run.started");
        assert!(json.get("event_type").is_none());
    }
}
