//! Baseline plan and plan merge.
//!
//! The baseline is what a scan runs with no planner at all: the
//! unconditional five steps, then the explorer quartet and the holders
//! step when their providers are configured. Planner proposals are merged
//! *after* the baseline — deduplicated by tool and restricted to available
//! tools — so prerequisite ordering (pairs before LP, source before ABI
//! checks) always holds.

use crate::evidence::ToolName;
use crate::types::PlannedStep;

/// Build the baseline plan for the available tool set, in canonical order.
pub fn baseline_plan(available: &[ToolName]) -> Vec<PlannedStep> {
    ToolName::ALL
        .into_iter()
        .filter(|tool| available.contains(tool))
        .map(PlannedStep::canonical)
        .collect()
}

/// Merge planner proposals into the baseline.
///
/// Proposed steps whose tool is already present are dropped (dedup is by
/// tool name, regardless of step key); the rest are appended in proposal
/// order, restricted to `available`. Merging a plan with itself is a
/// no-op.
pub fn merge_plan(
    baseline: &[PlannedStep],
    proposed: &[PlannedStep],
    available: &[ToolName],
) -> Vec<PlannedStep> {
    let mut merged: Vec<PlannedStep> = baseline.to_vec();
    for step in proposed {
        if !available.contains(&step.tool) {
            continue;
        }
        if merged.iter().any(|existing| existing.tool == step.tool) {
            continue;
        }
        merged.push(step.clone());
    }
    merged
}
