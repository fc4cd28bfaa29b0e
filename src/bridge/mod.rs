//! Planner/assessor bridge over the LLM.
//!
//! The model is treated as a structured-output oracle: both calls are
//! schema-constrained, both have deterministic fallbacks, and the
//! assessor's output is rejected unless every cited evidence id resolves
//! against the collected ledger. The pipeline runner only ever sees
//! `Result` values — a dead model degrades a scan, it never fails one.

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::evidence::{EvidenceLedger, ToolName};
use crate::providers::llm::{LlmClient, LlmError};
use crate::types::{Assessment, PlannedStep};

pub mod assessor;
pub mod chat;
pub mod planner;

/// An ordered plan proposed by the planner.
#[derive(Debug, Clone)]
pub struct ProposedPlan {
    /// Proposed steps in execution order.
    pub steps: Vec<PlannedStep>,
    /// Model that produced the plan.
    pub model_id: String,
}

/// A validated assessment plus the model that produced it.
#[derive(Debug, Clone)]
pub struct AssessmentOutcome {
    /// The validated assessment.
    pub assessment: Assessment,
    /// Model id recorded on the scan row.
    pub model_id: String,
}

/// The two LLM calls the pipeline makes. A trait so runner tests can
/// substitute canned analysts.
#[async_trait]
pub trait Analyst: Send + Sync {
    /// Propose an ordered investigation plan restricted to `available`
    /// tools.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] when no plan could be produced; the runner
    /// falls back to the baseline plan.
    async fn plan(
        &self,
        token_address: &str,
        available: &[ToolName],
    ) -> Result<ProposedPlan, LlmError>;

    /// Assess the collected evidence into a cited verdict.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] when every model/payload attempt failed; the
    /// runner falls back to the deterministic low-confidence assessment.
    async fn assess(
        &self,
        token_address: &str,
        ledger: &EvidenceLedger,
    ) -> Result<AssessmentOutcome, LlmError>;
}

/// The production [`Analyst`] backed by the configured LLM.
pub struct LlmAnalyst {
    client: LlmClient,
    model: String,
    fallback_model: String,
}

impl LlmAnalyst {
    /// Create an analyst from the configured client and model pair.
    pub fn new(client: LlmClient, config: &LlmConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            fallback_model: config.fallback_model.clone(),
        }
    }
}

#[async_trait]
impl Analyst for LlmAnalyst {
    async fn plan(
        &self,
        token_address: &str,
        available: &[ToolName],
    ) -> Result<ProposedPlan, LlmError> {
        planner::propose_plan(
            &self.client,
            &self.model,
            &self.fallback_model,
            token_address,
            available,
        )
        .await
    }

    async fn assess(
        &self,
        token_address: &str,
        ledger: &EvidenceLedger,
    ) -> Result<AssessmentOutcome, LlmError> {
        assessor::run_assessment(
            &self.client,
            &self.model,
            &self.fallback_model,
            token_address,
            ledger,
        )
        .await
    }
}
