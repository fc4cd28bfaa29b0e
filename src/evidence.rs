//! Evidence model: the canonical shape of a tool result.
//!
//! Every pipeline step produces exactly one [`EvidenceItem`], failed or not.
//! Items are collected into an [`EvidenceLedger`] which the assessor cites
//! by item id. The `data` payload is tool-specific JSON; the ledger exposes
//! strongly-typed accessors for the handful of fields later steps depend on,
//! so call sites never reach into raw JSON by string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Tool names ──────────────────────────────────────────────────

/// The closed set of investigation tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolName {
    /// Fetch contract bytecode over chain RPC.
    #[serde(rename = "rpc_getBytecode")]
    RpcGetBytecode,
    /// Read name/symbol/decimals/totalSupply over chain RPC.
    #[serde(rename = "rpc_getErc20Metadata")]
    RpcGetErc20Metadata,
    /// Verified source, ABI, and proxy info from the block explorer.
    #[serde(rename = "basescan_getSourceInfo")]
    BasescanGetSourceInfo,
    /// Deployer address and creation transaction from the block explorer.
    #[serde(rename = "basescan_getContractCreation")]
    BasescanGetContractCreation,
    /// Trading pairs from the DEX aggregator.
    #[serde(rename = "dexscreener_getPairs")]
    DexscreenerGetPairs,
    /// Buy/sell simulation from the honeypot checker.
    #[serde(rename = "honeypot_getSimulation")]
    HoneypotGetSimulation,
    /// V2 LP lock inference from pair-contract reserves.
    #[serde(rename = "lp_v2_lockStatus")]
    LpV2LockStatus,
    /// `owner()` probe and renouncement check.
    #[serde(rename = "contract_ownerStatus")]
    ContractOwnerStatus,
    /// ABI-driven capability flags (mint, pause, blacklist, fees).
    #[serde(rename = "contract_capabilityScan")]
    ContractCapabilityScan,
    /// Top holders and supply concentration from the indexed dataset.
    #[serde(rename = "holders_getTopHolders")]
    HoldersGetTopHolders,
}

impl ToolName {
    /// All tools, in canonical baseline-first order.
    pub const ALL: [ToolName; 10] = [
        ToolName::RpcGetBytecode,
        ToolName::RpcGetErc20Metadata,
        ToolName::DexscreenerGetPairs,
        ToolName::HoneypotGetSimulation,
        ToolName::LpV2LockStatus,
        ToolName::BasescanGetSourceInfo,
        ToolName::BasescanGetContractCreation,
        ToolName::ContractOwnerStatus,
        ToolName::ContractCapabilityScan,
        ToolName::HoldersGetTopHolders,
    ];

    /// The wire name, e.g. `rpc_getBytecode`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RpcGetBytecode => "rpc_getBytecode",
            Self::RpcGetErc20Metadata => "rpc_getErc20Metadata",
            Self::BasescanGetSourceInfo => "basescan_getSourceInfo",
            Self::BasescanGetContractCreation => "basescan_getContractCreation",
            Self::DexscreenerGetPairs => "dexscreener_getPairs",
            Self::HoneypotGetSimulation => "honeypot_getSimulation",
            Self::LpV2LockStatus => "lp_v2_lockStatus",
            Self::ContractOwnerStatus => "contract_ownerStatus",
            Self::ContractCapabilityScan => "contract_capabilityScan",
            Self::HoldersGetTopHolders => "holders_getTopHolders",
        }
    }

    /// Short domain prefix used in evidence ids.
    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::RpcGetBytecode | Self::RpcGetErc20Metadata => "rpc",
            Self::BasescanGetSourceInfo => "src",
            Self::BasescanGetContractCreation => "dep",
            Self::DexscreenerGetPairs => "dex",
            Self::HoneypotGetSimulation => "hp",
            Self::LpV2LockStatus => "lp",
            Self::ContractOwnerStatus => "own",
            Self::ContractCapabilityScan => "abi",
            Self::HoldersGetTopHolders => "hold",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown tool name: {s}"))
    }
}

// ── Evidence items ──────────────────────────────────────────────

/// Whether a tool produced usable data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceStatus {
    /// The tool returned data.
    Ok,
    /// The tool could not produce data; `error` explains why.
    Unavailable,
}

/// One tool invocation's result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceItem {
    /// Citation id, unique within a scan: `ev_<prefix>_<8 hex>`.
    pub id: String,
    /// Which tool produced this item.
    pub tool: ToolName,
    /// Human-readable title.
    pub title: String,
    /// The exact upstream URL the tool attempted, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// When the fetch happened.
    pub fetched_at: DateTime<Utc>,
    /// Outcome status.
    pub status: EvidenceStatus,
    /// Tool-specific payload. `{}` for unavailable items.
    pub data: serde_json::Value,
    /// Error string for unavailable items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvidenceItem {
    /// Build a successful item with a fresh id.
    pub fn ok(
        tool: ToolName,
        title: impl Into<String>,
        source_url: Option<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: new_evidence_id(tool),
            tool,
            title: title.into(),
            source_url,
            fetched_at: Utc::now(),
            status: EvidenceStatus::Ok,
            data,
            error: None,
        }
    }

    /// Build an unavailable item preserving the error string.
    pub fn unavailable(
        tool: ToolName,
        title: impl Into<String>,
        source_url: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: new_evidence_id(tool),
            tool,
            title: title.into(),
            source_url,
            fetched_at: Utc::now(),
            status: EvidenceStatus::Unavailable,
            data: serde_json::json!({}),
            error: Some(error.into()),
        }
    }

    /// Whether the tool produced usable data.
    pub fn is_ok(&self) -> bool {
        self.status == EvidenceStatus::Ok
    }
}

/// Generate a fresh evidence id: `ev_<prefix>_<8 lowercase hex>`.
///
/// The suffix comes from the OS entropy source, so collisions within a
/// scan's ten-odd items are not a practical concern.
pub fn new_evidence_id(tool: ToolName) -> String {
    let suffix: [u8; 4] = rand::random();
    format!("ev_{}_{}", tool.id_prefix(), hex::encode(suffix))
}

// ── Ledger ──────────────────────────────────────────────────────

/// The ordered collection of evidence gathered during one scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceLedger {
    /// Items in pipeline order.
    pub items: Vec<EvidenceItem>,
}

impl EvidenceLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item.
    pub fn push(&mut self, item: EvidenceItem) {
        self.items.push(item);
    }

    /// All item ids, in order.
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.id.clone()).collect()
    }

    /// The first item produced by `tool`, if any.
    pub fn find(&self, tool: ToolName) -> Option<&EvidenceItem> {
        self.items.iter().find(|i| i.tool == tool)
    }

    /// The first *successful* item produced by `tool`, if any.
    pub fn find_ok(&self, tool: ToolName) -> Option<&EvidenceItem> {
        self.items.iter().find(|i| i.tool == tool && i.is_ok())
    }

    /// Tools that ran but reported unavailable.
    pub fn unavailable_tools(&self) -> Vec<ToolName> {
        self.items
            .iter()
            .filter(|i| !i.is_ok())
            .map(|i| i.tool)
            .collect()
    }

    /// Whether any item id matches `id`.
    pub fn contains_id(&self, id: &str) -> bool {
        self.items.iter().any(|i| i.id == id)
    }

    // ── Typed cross-step accessors ──────────────────────────────
    //
    // Later steps depend on a few fields of earlier results. These
    // accessors are the only place the raw JSON field names appear.

    /// `hasCode` from the bytecode probe.
    pub fn bytecode_has_code(&self) -> Option<bool> {
        self.find_ok(ToolName::RpcGetBytecode)?
            .data
            .get("hasCode")?
            .as_bool()
    }

    /// The best pair's address from the DEX pairs result.
    pub fn best_pair_address(&self) -> Option<String> {
        let addr = self
            .find_ok(ToolName::DexscreenerGetPairs)?
            .data
            .get("bestPair")?
            .get("pairAddress")?
            .as_str()?;
        Some(addr.to_lowercase())
    }

    /// Deployer address from the contract-creation result.
    pub fn deployer_address(&self) -> Option<String> {
        let addr = self
            .find_ok(ToolName::BasescanGetContractCreation)?
            .data
            .get("deployerAddress")?
            .as_str()?;
        Some(addr.to_lowercase())
    }

    /// Raw ABI JSON from the source-info result, when the contract is
    /// verified.
    pub fn source_abi(&self) -> Option<String> {
        let abi = self
            .find_ok(ToolName::BasescanGetSourceInfo)?
            .data
            .get("abi")?
            .as_str()?;
        Some(abi.to_string())
    }

    /// Proxy flag from the source-info result.
    pub fn source_is_proxy(&self) -> Option<bool> {
        self.find_ok(ToolName::BasescanGetSourceInfo)?
            .data
            .get("isProxy")?
            .as_bool()
    }

    /// Token decimals from the ERC-20 metadata result.
    pub fn erc20_decimals(&self) -> Option<u32> {
        let n = self
            .find_ok(ToolName::RpcGetErc20Metadata)?
            .data
            .get("decimals")?
            .as_u64()?;
        u32::try_from(n).ok()
    }

    /// Total supply (decimal string, base units) from the ERC-20 metadata
    /// result.
    pub fn erc20_total_supply(&self) -> Option<String> {
        let s = self
            .find_ok(ToolName::RpcGetErc20Metadata)?
            .data
            .get("totalSupply")?
            .as_str()?;
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_name_roundtrip() {
        for tool in ToolName::ALL {
            let s = tool.to_string();
            let parsed: ToolName = s.parse().expect("roundtrip should work");
            assert_eq!(tool, parsed);
        }
    }

    #[test]
    fn test_tool_name_serde_uses_wire_names() {
        let json = serde_json::to_string(&ToolName::LpV2LockStatus).expect("serialize");
        assert_eq!(json, "\"lp_v2_lockStatus\"");
        let back: ToolName = serde_json::from_str("\"holders_getTopHolders\"").expect("parse");
        assert_eq!(back, ToolName::HoldersGetTopHolders);
    }

    #[test]
    fn test_evidence_id_shape() {
        let id = new_evidence_id(ToolName::DexscreenerGetPairs);
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ev");
        assert_eq!(parts[1], "dex");
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_evidence_ids_are_unique() {
        let a = new_evidence_id(ToolName::RpcGetBytecode);
        let b = new_evidence_id(ToolName::RpcGetBytecode);
        assert_ne!(a, b);
    }

    #[test]
    fn test_unavailable_item_preserves_error() {
        let item = EvidenceItem::unavailable(
            ToolName::HoldersGetTopHolders,
            "Top holders",
            None,
            "Bitquery request failed with 429",
        );
        assert!(!item.is_ok());
        assert_eq!(
            item.error.as_deref(),
            Some("Bitquery request failed with 429")
        );
        assert_eq!(item.data, serde_json::json!({}));
    }

    #[test]
    fn test_ledger_typed_accessors() {
        let mut ledger = EvidenceLedger::new();
        ledger.push(EvidenceItem::ok(
            ToolName::DexscreenerGetPairs,
            "DEX pairs",
            None,
            serde_json::json!({
                "pairCount": 1,
                "bestPair": { "pairAddress": "0xAbC0000000000000000000000000000000000001" }
            }),
        ));
        ledger.push(EvidenceItem::ok(
            ToolName::RpcGetErc20Metadata,
            "ERC-20 metadata",
            None,
            serde_json::json!({ "decimals": 18, "totalSupply": "1000000000000000000000" }),
        ));

        assert_eq!(
            ledger.best_pair_address().as_deref(),
            Some("0xabc0000000000000000000000000000000000001")
        );
        assert_eq!(ledger.erc20_decimals(), Some(18));
        assert_eq!(
            ledger.erc20_total_supply().as_deref(),
            Some("1000000000000000000000")
        );
        assert!(ledger.deployer_address().is_none());
    }

    #[test]
    fn test_ledger_skips_unavailable_items_in_accessors() {
        let mut ledger = EvidenceLedger::new();
        ledger.push(EvidenceItem::unavailable(
            ToolName::DexscreenerGetPairs,
            "DEX pairs",
            None,
            "timeout",
        ));
        assert!(ledger.best_pair_address().is_none());
        assert_eq!(
            ledger.unavailable_tools(),
            vec![ToolName::DexscreenerGetPairs]
        );
    }

    #[test]
    fn test_ledger_serde_roundtrip() {
        let mut ledger = EvidenceLedger::new();
        ledger.push(EvidenceItem::ok(
            ToolName::RpcGetBytecode,
            "Bytecode",
            Some("https://mainnet.base.org".to_string()),
            serde_json::json!({ "hasCode": true, "bytecodeSizeBytes": 1204 }),
        ));
        let json = serde_json::to_value(&ledger).expect("serialize");
        assert_eq!(json["items"][0]["tool"], "rpc_getBytecode");
        assert_eq!(json["items"][0]["status"], "ok");
        let back: EvidenceLedger = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.items.len(), 1);
        assert_eq!(back.bytecode_has_code(), Some(true));
    }
}
