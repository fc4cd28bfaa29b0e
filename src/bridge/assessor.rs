//! Assessor: turns the evidence ledger into a cited, validated verdict.
//!
//! Four attempts are made in a fixed order — `(primary, full)`,
//! `(primary, compact)`, `(fallback, full)`, `(fallback, compact)` — where
//! `compact` is a size-bounded rendering of the same ledger. The ladder
//! advances on empty completions and on citation-validation rejections;
//! transport errors abort it. When everything fails the runner substitutes
//! [`fallback_assessment`], which is honest about its own uncertainty.

use serde_json::Value;

use crate::evidence::EvidenceLedger;
use crate::providers::llm::{LlmClient, LlmError};
use crate::types::{
    Assessment, AssessmentReason, CategoryScores, ConfidenceLevel, RiskLevel,
};

use super::AssessmentOutcome;

const ASSESSOR_SYSTEM_PROMPT: &str = "\
You are a token risk assessor. You receive a token address and an evidence \
ledger collected by deterministic tools. Produce a structured risk \
assessment.

Rules:
1. Base every claim strictly on the evidence ledger. Never invent facts.
2. Every reason must cite the ids of the evidence items it rests on in \
evidenceRefs.
3. When evidence is missing or a tool was unavailable, lower your \
confidence and list what is missing in missingData — do not guess.
4. overallScore: 0 means safe, 100 means avoid. Category scores use the \
same direction.";

/// Truncation bound for strings in the compact payload.
const COMPACT_STRING_CHARS: usize = 280;
/// Array length cap in the compact payload.
const COMPACT_ARRAY_CAP: usize = 12;
/// Object entry cap in the compact payload.
const COMPACT_OBJECT_CAP: usize = 16;
/// Nesting depth kept in the compact payload.
const COMPACT_DEPTH: usize = 2;

/// Which rendering of the ledger an attempt sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadVariant {
    /// The ledger as-is.
    Full,
    /// Strings truncated, depth-2, child caps applied.
    Compact,
}

// ── Schema ──────────────────────────────────────────────────────

/// JSON schema for the assessor's constrained output.
#[doc(hidden)]
pub fn assessment_schema() -> Value {
    let score = serde_json::json!({ "type": "integer", "minimum": 0, "maximum": 100 });
    serde_json::json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string", "minLength": 1 },
            "overallScore": score,
            "riskLevel": { "type": "string", "enum": ["low", "medium", "high", "critical"] },
            "confidence": { "type": "string", "enum": ["low", "medium", "high"] },
            "categoryScores": {
                "type": "object",
                "properties": {
                    "contractSecurity": score,
                    "liquidity": score,
                    "holderDistribution": score,
                    "marketActivity": score,
                    "transparency": score
                },
                "required": [
                    "contractSecurity", "liquidity", "holderDistribution",
                    "marketActivity", "transparency"
                ],
                "additionalProperties": false
            },
            "reasons": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "detail": { "type": "string" },
                        "evidenceRefs": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["title", "detail", "evidenceRefs"],
                    "additionalProperties": false
                }
            },
            "missingData": { "type": "array", "items": { "type": "string" } }
        },
        "required": [
            "summary", "overallScore", "riskLevel", "confidence",
            "categoryScores", "reasons", "missingData"
        ],
        "additionalProperties": false
    })
}

// ── Payload rendering ───────────────────────────────────────────

/// Recursively bound a JSON value for the compact payload.
#[doc(hidden)]
pub fn compact_value(value: &Value, depth: usize) -> Value {
    match value {
        Value::String(s) => {
            if s.chars().count() > COMPACT_STRING_CHARS {
                let truncated: String = s.chars().take(COMPACT_STRING_CHARS).collect();
                Value::String(format!("{truncated}…"))
            } else {
                value.clone()
            }
        }
        Value::Array(items) => {
            if depth == 0 {
                return Value::String(format!("[{} items]", items.len()));
            }
            Value::Array(
                items
                    .iter()
                    .take(COMPACT_ARRAY_CAP)
                    .map(|v| compact_value(v, depth.saturating_sub(1)))
                    .collect(),
            )
        }
        Value::Object(map) => {
            if depth == 0 {
                return Value::String(format!("{{{} fields}}", map.len()));
            }
            Value::Object(
                map.iter()
                    .take(COMPACT_OBJECT_CAP)
                    .map(|(k, v)| (k.clone(), compact_value(v, depth.saturating_sub(1))))
                    .collect(),
            )
        }
        _ => value.clone(),
    }
}

/// Render the ledger for the prompt under the given variant.
#[doc(hidden)]
pub fn evidence_payload(ledger: &EvidenceLedger, variant: PayloadVariant) -> String {
    let items: Vec<Value> = ledger
        .items
        .iter()
        .map(|item| {
            let data = match variant {
                PayloadVariant::Full => item.data.clone(),
                PayloadVariant::Compact => compact_value(&item.data, COMPACT_DEPTH),
            };
            serde_json::json!({
                "id": &item.id,
                "tool": item.tool,
                "title": &item.title,
                "status": item.status,
                "error": &item.error,
                "data": data,
            })
        })
        .collect();
    serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string())
}

fn compose_prompt(token_address: &str, payload: &str) -> String {
    format!(
        "Token address: {token_address}\nNetwork: base\n\nEvidence ledger:\n{payload}\n\n\
         Produce the structured assessment."
    )
}

// ── Validation ──────────────────────────────────────────────────

/// Fill empty `evidenceRefs` lists with the full set of ledger ids. An
/// assessor that grounded a reason on "everything" is acceptable; an
/// unresolvable citation is not.
#[doc(hidden)]
pub fn hydrate_reasons(assessment: &mut Assessment, all_ids: &[String]) {
    for reason in &mut assessment.reasons {
        if reason.evidence_refs.is_empty() {
            reason.evidence_refs = all_ids.to_vec();
        }
    }
}

/// Validate an assessment against the ledger.
///
/// # Errors
///
/// Returns a human-readable rejection reason when the assessment has no
/// reasons, a blank title or detail, or a citation that does not resolve.
pub fn validate_assessment(assessment: &Assessment, ledger: &EvidenceLedger) -> Result<(), String> {
    if assessment.summary.trim().is_empty() {
        return Err("summary is empty".to_string());
    }
    if assessment.reasons.is_empty() {
        return Err("assessment has no reasons".to_string());
    }
    for (idx, reason) in assessment.reasons.iter().enumerate() {
        if reason.title.trim().is_empty() || reason.detail.trim().is_empty() {
            return Err(format!("reason {idx} has a blank title or detail"));
        }
        if reason.evidence_refs.is_empty() {
            return Err(format!("reason {idx} cites no evidence"));
        }
        for evidence_ref in &reason.evidence_refs {
            if !ledger.contains_id(evidence_ref) {
                return Err(format!(
                    "reason {idx} cites unknown evidence id {evidence_ref}"
                ));
            }
        }
    }
    Ok(())
}

// ── Ladder ──────────────────────────────────────────────────────

/// Run the assessor across the model/payload ladder.
///
/// # Errors
///
/// Returns [`LlmError`] when the ladder is exhausted or a transport error
/// aborts it.
pub async fn run_assessment(
    client: &LlmClient,
    model: &str,
    fallback_model: &str,
    token_address: &str,
    ledger: &EvidenceLedger,
) -> Result<AssessmentOutcome, LlmError> {
    let schema = assessment_schema();
    let all_ids = ledger.ids();

    let mut attempts: Vec<(&str, PayloadVariant)> = vec![
        (model, PayloadVariant::Full),
        (model, PayloadVariant::Compact),
    ];
    if fallback_model != model {
        attempts.push((fallback_model, PayloadVariant::Full));
        attempts.push((fallback_model, PayloadVariant::Compact));
    }

    for (attempt_model, variant) in attempts {
        let payload = evidence_payload(ledger, variant);
        let prompt = compose_prompt(token_address, &payload);
        let value = match client
            .complete_json(attempt_model, ASSESSOR_SYSTEM_PROMPT, &prompt, "assessment", &schema)
            .await
        {
            Ok(value) => value,
            Err(e) if e.is_no_output() => {
                tracing::warn!(model = attempt_model, ?variant, "assessor produced no output");
                continue;
            }
            Err(e) => return Err(e),
        };

        let mut assessment: Assessment = match serde_json::from_value(value) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(model = attempt_model, ?variant, error = %e, "assessor output failed to parse");
                continue;
            }
        };

        hydrate_reasons(&mut assessment, &all_ids);
        match validate_assessment(&assessment, ledger) {
            Ok(()) => {
                return Ok(AssessmentOutcome {
                    assessment,
                    model_id: attempt_model.to_string(),
                })
            }
            Err(rejection) => {
                tracing::warn!(
                    model = attempt_model,
                    ?variant,
                    rejection = %rejection,
                    "assessor output rejected by citation validation"
                );
            }
        }
    }

    Err(LlmError::NoOutput(
        "all assessor model/payload attempts failed".to_string(),
    ))
}

// ── Deterministic fallback ──────────────────────────────────────

/// The low-confidence assessment used when the LLM cannot produce one.
///
/// Scores sit at a neutral midpoint and the text says plainly that the AI
/// layer was unavailable; both reasons cite the entire ledger.
pub fn fallback_assessment(ledger: &EvidenceLedger) -> Assessment {
    let all_ids = ledger.ids();
    let mut missing_data = vec!["AI assessment output could not be generated".to_string()];
    let unavailable = ledger.unavailable_tools();
    if !unavailable.is_empty() {
        let names: Vec<&str> = unavailable.iter().map(|t| t.as_str()).collect();
        missing_data.push(format!(
            "Upstream data was unavailable for: {}",
            names.join(", ")
        ));
    }

    Assessment {
        summary: "The AI assessor was unavailable for this scan. The evidence below was \
                  collected successfully, but the scores are a neutral baseline reflecting \
                  uncertainty, not a measured verdict."
            .to_string(),
        overall_score: 55,
        risk_level: RiskLevel::Medium,
        confidence: ConfidenceLevel::Low,
        category_scores: CategoryScores {
            contract_security: 50,
            liquidity: 55,
            holder_distribution: 55,
            market_activity: 60,
            transparency: 60,
        },
        reasons: vec![
            AssessmentReason {
                title: "Automated assessment unavailable".to_string(),
                detail: "The AI assessor could not produce an output for this scan, so the \
                         overall score is a neutral placeholder rather than a measured risk."
                    .to_string(),
                evidence_refs: all_ids.clone(),
            },
            AssessmentReason {
                title: "Evidence collected without interpretation".to_string(),
                detail: "Review the collected evidence directly; it has not been weighed by \
                         the assessor."
                    .to_string(),
                evidence_refs: all_ids,
            },
        ],
        missing_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{EvidenceItem, ToolName};

    fn ledger_with_items() -> EvidenceLedger {
        let mut ledger = EvidenceLedger::new();
        ledger.push(EvidenceItem::ok(
            ToolName::RpcGetBytecode,
            "Contract bytecode",
            None,
            serde_json::json!({ "hasCode": true }),
        ));
        ledger.push(EvidenceItem::unavailable(
            ToolName::HoldersGetTopHolders,
            "Top holders",
            None,
            "Bitquery request failed with 429",
        ));
        ledger
    }

    fn valid_assessment(ledger: &EvidenceLedger) -> Assessment {
        Assessment {
            summary: "Low risk".to_string(),
            overall_score: 22,
            risk_level: RiskLevel::Low,
            confidence: ConfidenceLevel::High,
            category_scores: CategoryScores {
                contract_security: 20,
                liquidity: 25,
                holder_distribution: 30,
                market_activity: 20,
                transparency: 15,
            },
            reasons: vec![AssessmentReason {
                title: "Contract is deployed".to_string(),
                detail: "Bytecode exists at the address".to_string(),
                evidence_refs: vec![ledger.items[0].id.clone()],
            }],
            missing_data: vec![],
        }
    }

    #[test]
    fn test_validate_accepts_resolving_citations() {
        let ledger = ledger_with_items();
        let assessment = valid_assessment(&ledger);
        assert!(validate_assessment(&assessment, &ledger).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_refs() {
        let ledger = ledger_with_items();
        let mut assessment = valid_assessment(&ledger);
        assessment.reasons[0].evidence_refs = vec!["ev_rpc_ffffffff".to_string()];
        let rejection = validate_assessment(&assessment, &ledger).expect_err("should reject");
        assert!(rejection.contains("unknown evidence id"));
    }

    #[test]
    fn test_validate_rejects_blank_reason() {
        let ledger = ledger_with_items();
        let mut assessment = valid_assessment(&ledger);
        assessment.reasons[0].title = "   ".to_string();
        assert!(validate_assessment(&assessment, &ledger).is_err());
    }

    #[test]
    fn test_validate_rejects_no_reasons() {
        let ledger = ledger_with_items();
        let mut assessment = valid_assessment(&ledger);
        assessment.reasons.clear();
        assert!(validate_assessment(&assessment, &ledger).is_err());
    }

    #[test]
    fn test_hydrate_fills_empty_refs_only() {
        let ledger = ledger_with_items();
        let mut assessment = valid_assessment(&ledger);
        let explicit = assessment.reasons[0].evidence_refs.clone();
        assessment.reasons.push(AssessmentReason {
            title: "Holders unknown".to_string(),
            detail: "Holder data was unavailable".to_string(),
            evidence_refs: vec![],
        });
        hydrate_reasons(&mut assessment, &ledger.ids());
        assert_eq!(assessment.reasons[0].evidence_refs, explicit);
        assert_eq!(assessment.reasons[1].evidence_refs, ledger.ids());
        assert!(validate_assessment(&assessment, &ledger).is_ok());
    }

    #[test]
    fn test_fallback_assessment_shape() {
        let ledger = ledger_with_items();
        let fallback = fallback_assessment(&ledger);
        assert_eq!(fallback.overall_score, 55);
        assert_eq!(fallback.risk_level, RiskLevel::Medium);
        assert_eq!(fallback.confidence, ConfidenceLevel::Low);
        assert_eq!(fallback.category_scores.contract_security, 50);
        assert_eq!(fallback.category_scores.transparency, 60);
        assert_eq!(fallback.reasons.len(), 2);
        assert!(validate_assessment(&fallback, &ledger).is_ok());
        assert_eq!(
            fallback.missing_data[0],
            "AI assessment output could not be generated"
        );
        assert!(fallback.missing_data[1].contains("holders_getTopHolders"));
    }

    #[test]
    fn test_fallback_without_unavailable_tools_has_single_note() {
        let mut ledger = EvidenceLedger::new();
        ledger.push(EvidenceItem::ok(
            ToolName::RpcGetBytecode,
            "Contract bytecode",
            None,
            serde_json::json!({ "hasCode": true }),
        ));
        let fallback = fallback_assessment(&ledger);
        assert_eq!(fallback.missing_data.len(), 1);
    }

    #[test]
    fn test_compact_value_truncates_strings() {
        let long = "a".repeat(500);
        let compacted = compact_value(&serde_json::json!(long), COMPACT_DEPTH);
        let s = compacted.as_str().expect("string");
        assert!(s.chars().count() <= COMPACT_STRING_CHARS + 1);
        assert!(s.ends_with('…'));
    }

    #[test]
    fn test_compact_value_caps_depth() {
        let nested = serde_json::json!({ "a": { "b": { "c": { "d": 1 } } } });
        let compacted = compact_value(&nested, COMPACT_DEPTH);
        // Depth 2 keeps "a" and "b" as objects; "c"'s contents collapse.
        assert!(compacted["a"]["b"].is_string() || compacted["a"]["b"]["c"].is_string());
    }

    #[test]
    fn test_compact_value_caps_arrays() {
        let many: Vec<u32> = (0..100).collect();
        let compacted = compact_value(&serde_json::json!(many), COMPACT_DEPTH);
        assert_eq!(compacted.as_array().expect("array").len(), COMPACT_ARRAY_CAP);
    }

    #[test]
    fn test_evidence_payload_includes_ids_and_errors() {
        let ledger = ledger_with_items();
        let payload = evidence_payload(&ledger, PayloadVariant::Compact);
        assert!(payload.contains(&ledger.items[0].id));
        assert!(payload.contains("Bitquery request failed with 429"));
    }

    #[test]
    fn test_assessment_schema_requires_all_fields() {
        let schema = assessment_schema();
        let required = schema["required"].as_array().expect("required");
        assert_eq!(required.len(), 7);
        assert!(required.contains(&serde_json::json!("categoryScores")));
    }
}
