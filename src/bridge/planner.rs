//! Planner: asks the LLM for an ordered tool list with reasons.
//!
//! The output schema pins the tool enum to the set available under the
//! current configuration, so the model cannot propose a tool the process
//! cannot run. One retry with the fallback model on an empty completion;
//! every other failure is the runner's cue to use the baseline plan.

use serde_json::Value;

use crate::evidence::ToolName;
use crate::providers::llm::{LlmClient, LlmError};
use crate::types::PlannedStep;

use super::ProposedPlan;

const PLANNER_SYSTEM_PROMPT: &str = "\
You plan on-chain token risk investigations. Given a token contract address \
and the list of available tools, produce an ordered investigation plan.

Rules:
1. Use only tools from the provided list.
2. Order steps so prerequisites come first: bytecode before anything else, \
DEX pairs before LP analysis, source info before ABI-derived checks.
3. Give each step a short, specific reason tied to this investigation.
4. Do not invent tools, addresses, or data.";

/// JSON schema for the planner's constrained output.
#[doc(hidden)]
pub fn plan_schema(available: &[ToolName]) -> Value {
    let tool_names: Vec<&str> = available.iter().map(|t| t.as_str()).collect();
    serde_json::json!({
        "type": "object",
        "properties": {
            "steps": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "properties": {
                        "tool": { "type": "string", "enum": tool_names },
                        "reason": { "type": "string" }
                    },
                    "required": ["tool", "reason"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["steps"],
        "additionalProperties": false
    })
}

/// Compose the planner's user prompt.
#[doc(hidden)]
pub fn compose_prompt(token_address: &str, available: &[ToolName]) -> String {
    let mut tool_lines = String::new();
    for tool in available {
        tool_lines.push_str(&format!(
            "- {}: {}\n",
            tool.as_str(),
            PlannedStep::default_reason(*tool)
        ));
    }
    format!(
        "Token address: {token_address}\nNetwork: base\n\nAvailable tools:\n{tool_lines}\n\
         Produce the ordered plan."
    )
}

/// Parse the constrained planner output into steps.
///
/// Tools outside `available` (which the schema should already prevent) are
/// dropped; an output with no usable steps is an error.
///
/// # Errors
///
/// Returns `LlmError::Parse` when no valid steps remain.
#[doc(hidden)]
pub fn parse_proposed_steps(
    value: &Value,
    available: &[ToolName],
) -> Result<Vec<PlannedStep>, LlmError> {
    let raw_steps = value
        .get("steps")
        .and_then(|s| s.as_array())
        .ok_or_else(|| LlmError::Parse("planner output missing steps".to_string()))?;

    let steps: Vec<PlannedStep> = raw_steps
        .iter()
        .filter_map(|step| {
            let tool: ToolName = step.get("tool")?.as_str()?.parse().ok()?;
            if !available.contains(&tool) {
                return None;
            }
            let reason = step
                .get("reason")
                .and_then(|r| r.as_str())
                .filter(|r| !r.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| PlannedStep::default_reason(tool).to_string());
            Some(PlannedStep::with_reason(tool, reason))
        })
        .collect();

    if steps.is_empty() {
        return Err(LlmError::Parse(
            "planner output contained no usable steps".to_string(),
        ));
    }
    Ok(steps)
}

/// Ask the LLM for a plan, retrying once on the fallback model when the
/// primary produces no output.
///
/// # Errors
///
/// Returns [`LlmError`] when both attempts fail.
pub async fn propose_plan(
    client: &LlmClient,
    model: &str,
    fallback_model: &str,
    token_address: &str,
    available: &[ToolName],
) -> Result<ProposedPlan, LlmError> {
    let schema = plan_schema(available);
    let prompt = compose_prompt(token_address, available);

    let first = client
        .complete_json(model, PLANNER_SYSTEM_PROMPT, &prompt, "investigation_plan", &schema)
        .await;

    let (value, model_id) = match first {
        Ok(value) => (value, model.to_string()),
        Err(e) if e.is_no_output() && model != fallback_model => {
            tracing::warn!(model, error = %e, "planner produced no output, retrying on fallback model");
            let value = client
                .complete_json(
                    fallback_model,
                    PLANNER_SYSTEM_PROMPT,
                    &prompt,
                    "investigation_plan",
                    &schema,
                )
                .await?;
            (value, fallback_model.to_string())
        }
        Err(e) => return Err(e),
    };

    let steps = parse_proposed_steps(&value, available)?;
    Ok(ProposedPlan { steps, model_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASELINE: [ToolName; 5] = [
        ToolName::RpcGetBytecode,
        ToolName::RpcGetErc20Metadata,
        ToolName::DexscreenerGetPairs,
        ToolName::HoneypotGetSimulation,
        ToolName::LpV2LockStatus,
    ];

    #[test]
    fn test_plan_schema_pins_tool_enum() {
        let schema = plan_schema(&BASELINE);
        let enum_values = schema["properties"]["steps"]["items"]["properties"]["tool"]["enum"]
            .as_array()
            .expect("enum");
        assert_eq!(enum_values.len(), 5);
        assert!(enum_values.contains(&serde_json::json!("rpc_getBytecode")));
        assert!(!enum_values.contains(&serde_json::json!("holders_getTopHolders")));
    }

    #[test]
    fn test_parse_proposed_steps() {
        let value = serde_json::json!({
            "steps": [
                { "tool": "rpc_getBytecode", "reason": "confirm deployment" },
                { "tool": "dexscreener_getPairs", "reason": "check liquidity" }
            ]
        });
        let steps = parse_proposed_steps(&value, &BASELINE).expect("parse");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].tool, ToolName::RpcGetBytecode);
        assert_eq!(steps[0].step_key, "rpc_bytecode");
        assert_eq!(steps[1].reason, "check liquidity");
    }

    #[test]
    fn test_parse_drops_unavailable_tools() {
        let value = serde_json::json!({
            "steps": [
                { "tool": "holders_getTopHolders", "reason": "concentration" },
                { "tool": "rpc_getBytecode", "reason": "confirm deployment" }
            ]
        });
        let steps = parse_proposed_steps(&value, &BASELINE).expect("parse");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].tool, ToolName::RpcGetBytecode);
    }

    #[test]
    fn test_parse_empty_steps_is_error() {
        let value = serde_json::json!({ "steps": [] });
        assert!(parse_proposed_steps(&value, &BASELINE).is_err());
    }

    #[test]
    fn test_parse_blank_reason_gets_default() {
        let value = serde_json::json!({
            "steps": [{ "tool": "rpc_getBytecode", "reason": "  " }]
        });
        let steps = parse_proposed_steps(&value, &BASELINE).expect("parse");
        assert_eq!(
            steps[0].reason,
            PlannedStep::default_reason(ToolName::RpcGetBytecode)
        );
    }

    #[test]
    fn test_compose_prompt_lists_tools() {
        let prompt = compose_prompt("0xabc", &BASELINE);
        assert!(prompt.contains("0xabc"));
        assert!(prompt.contains("rpc_getBytecode"));
        assert!(prompt.contains("lp_v2_lockStatus"));
    }
}
