//! Evidence-grounded chat about a finished scan.
//!
//! The model only ever sees a bounded snapshot: the last few conversation
//! messages plus the evidence items most relevant to the latest question,
//! selected by keyword. The system prompt forbids answering from anything
//! but the snapshot, and asks for evidence-id citations inline.

use serde::Deserialize;
use serde_json::Value;

use crate::evidence::{EvidenceLedger, ToolName};
use crate::providers::llm::{LlmClient, LlmError, WireMessage};

/// Messages kept from the conversation tail.
const MAX_CHAT_MESSAGES: usize = 6;
/// Per-message content truncation.
const MAX_MESSAGE_CHARS: usize = 2000;
/// Evidence items included in the snapshot.
const MAX_SNAPSHOT_ITEMS: usize = 8;
/// Prompt budget; above this the snapshot drops `data` payloads.
const MAX_PROMPT_CHARS: usize = 24_000;

const CHAT_SYSTEM_PROMPT: &str = "\
You answer questions about a completed token risk scan. You are given an \
evidence snapshot: tool results with ids.

Rules:
1. Answer ONLY from the snapshot. If it does not contain the answer, say \
so plainly.
2. Cite the ids of the evidence items you used, e.g. (ev_dex_1a2b3c4d).
3. Never speculate about data that was unavailable; name what is missing \
instead.
4. Keep answers short and concrete.";

/// An incoming chat message from the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    /// `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

/// Tools most relevant to a user question, inferred from keywords. The
/// returned list is a preference order; tools not listed keep ledger
/// order after the preferred ones.
#[doc(hidden)]
pub fn preferred_tools(query: &str) -> Vec<ToolName> {
    let q = query.to_lowercase();
    let mut preferred = Vec::new();
    let mut add = |tools: &[ToolName]| {
        for t in tools {
            if !preferred.contains(t) {
                preferred.push(*t);
            }
        }
    };

    if ["holder", "whale", "concentration", "distribution"]
        .iter()
        .any(|k| q.contains(k))
    {
        add(&[ToolName::HoldersGetTopHolders, ToolName::RpcGetErc20Metadata]);
    }
    if ["liquidity", "lp", "lock", "pool", "pair", "rug"]
        .iter()
        .any(|k| q.contains(k))
    {
        add(&[ToolName::LpV2LockStatus, ToolName::DexscreenerGetPairs]);
    }
    if ["honeypot", "tax", "sell", "buy", "slippage"]
        .iter()
        .any(|k| q.contains(k))
    {
        add(&[ToolName::HoneypotGetSimulation]);
    }
    if ["owner", "renounce", "admin", "mint", "pause", "blacklist", "capabilit"]
        .iter()
        .any(|k| q.contains(k))
    {
        add(&[
            ToolName::ContractOwnerStatus,
            ToolName::ContractCapabilityScan,
        ]);
    }
    if ["source", "verified", "proxy", "compiler", "deploy"]
        .iter()
        .any(|k| q.contains(k))
    {
        add(&[
            ToolName::BasescanGetSourceInfo,
            ToolName::BasescanGetContractCreation,
        ]);
    }
    preferred
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max).collect();
    format!("{truncated}…")
}

/// Build the evidence snapshot for a question: preferred tools first,
/// capped item count, optionally stripped of `data` payloads.
#[doc(hidden)]
pub fn build_snapshot(ledger: &EvidenceLedger, query: &str, include_data: bool) -> Value {
    let preference = preferred_tools(query);
    let rank = |tool: ToolName| -> usize {
        preference
            .iter()
            .position(|t| *t == tool)
            .unwrap_or(preference.len())
    };

    let mut indexed: Vec<(usize, usize)> = ledger
        .items
        .iter()
        .enumerate()
        .map(|(idx, item)| (rank(item.tool), idx))
        .collect();
    indexed.sort(); // stable order: preference rank, then ledger order

    let items: Vec<Value> = indexed
        .iter()
        .take(MAX_SNAPSHOT_ITEMS)
        .map(|(_, idx)| {
            let item = &ledger.items[*idx];
            let mut entry = serde_json::json!({
                "id": &item.id,
                "tool": item.tool,
                "title": &item.title,
                "status": item.status,
                "error": &item.error,
            });
            if include_data {
                if let Some(map) = entry.as_object_mut() {
                    map.insert("data".to_string(), item.data.clone());
                }
            }
            entry
        })
        .collect();

    serde_json::json!({ "evidence": items })
}

/// Answer a question about a scan from its persisted evidence ledger.
///
/// # Errors
///
/// Returns [`LlmError`] on transport failure or empty output.
pub async fn answer_about_scan(
    client: &LlmClient,
    model: &str,
    token_address: &str,
    ledger: &EvidenceLedger,
    messages: &[ChatMessage],
) -> Result<String, LlmError> {
    let latest_query: String = messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .unwrap_or_default();

    let tail: Vec<&ChatMessage> = messages
        .iter()
        .rev()
        .take(MAX_CHAT_MESSAGES)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let mut snapshot = build_snapshot(ledger, &latest_query, true);
    let mut context = format!(
        "Token address: {token_address}\nNetwork: base\n\nEvidence snapshot:\n{}",
        serde_json::to_string_pretty(&snapshot).unwrap_or_else(|_| "{}".to_string())
    );
    if context.chars().count() > MAX_PROMPT_CHARS {
        snapshot = build_snapshot(ledger, &latest_query, false);
        context = format!(
            "Token address: {token_address}\nNetwork: base\n\nEvidence snapshot \
             (data payloads omitted for size):\n{}",
            serde_json::to_string_pretty(&snapshot).unwrap_or_else(|_| "{}".to_string())
        );
    }

    let mut wire: Vec<WireMessage> = Vec::with_capacity(tail.len().saturating_add(1));
    wire.push(WireMessage {
        role: "user".to_string(),
        content: context,
    });
    for message in tail {
        let role = if message.role == "assistant" {
            "assistant"
        } else {
            "user"
        };
        wire.push(WireMessage {
            role: role.to_string(),
            content: truncate_chars(&message.content, MAX_MESSAGE_CHARS),
        });
    }

    client.complete_text(model, CHAT_SYSTEM_PROMPT, &wire).await
}
