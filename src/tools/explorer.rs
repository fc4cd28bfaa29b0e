//! Explorer-backed tools: source info, contract creation, owner status,
//! and the ABI capability scan.

use async_trait::async_trait;

use crate::analyzers::abi;
use crate::evidence::{EvidenceItem, ToolName};
use crate::providers::explorer::ExplorerClient;
use crate::providers::rpc::{RpcClient, SELECTOR_OWNER};

use super::{ToolContext, ToolExecutor};

// ── Source info ─────────────────────────────────────────────────

/// `basescan_getSourceInfo`: verified source, ABI, and proxy flags.
pub struct SourceInfoTool {
    explorer: ExplorerClient,
}

impl SourceInfoTool {
    /// Create the tool.
    pub fn new(explorer: ExplorerClient) -> Self {
        Self { explorer }
    }
}

#[async_trait]
impl ToolExecutor for SourceInfoTool {
    async fn execute(&self, ctx: &ToolContext<'_>) -> EvidenceItem {
        let tool = ToolName::BasescanGetSourceInfo;
        let title = "Verified source & ABI";
        let source_url = Some(self.explorer.action_url("getsourcecode", ctx.token_address));

        match self.explorer.get_source_info(ctx.token_address).await {
            Ok(info) => EvidenceItem::ok(
                tool,
                title,
                Some(info.source_url.clone()),
                serde_json::json!({
                    "address": ctx.token_address,
                    "verified": info.verified,
                    "contractName": info.contract_name,
                    "compilerVersion": info.compiler_version,
                    "license": info.license,
                    "isProxy": info.is_proxy,
                    "implementation": info.implementation,
                    "hasAbi": info.abi.is_some(),
                    "abi": info.abi,
                }),
            ),
            Err(e) => EvidenceItem::unavailable(tool, title, source_url, e.to_string()),
        }
    }
}

// ── Contract creation ───────────────────────────────────────────

/// `basescan_getContractCreation`: deployer address and creation tx.
pub struct ContractCreationTool {
    explorer: ExplorerClient,
}

impl ContractCreationTool {
    /// Create the tool.
    pub fn new(explorer: ExplorerClient) -> Self {
        Self { explorer }
    }
}

#[async_trait]
impl ToolExecutor for ContractCreationTool {
    async fn execute(&self, ctx: &ToolContext<'_>) -> EvidenceItem {
        let tool = ToolName::BasescanGetContractCreation;
        let title = "Contract creation";
        let source_url = Some(
            self.explorer
                .action_url("getcontractcreation", ctx.token_address),
        );

        match self.explorer.get_contract_creation(ctx.token_address).await {
            Ok(creation) => EvidenceItem::ok(
                tool,
                title,
                Some(creation.source_url.clone()),
                serde_json::json!({
                    "address": ctx.token_address,
                    "deployerAddress": creation.deployer_address,
                    "txHash": creation.tx_hash,
                }),
            ),
            Err(e) => EvidenceItem::unavailable(tool, title, source_url, e.to_string()),
        }
    }
}

// ── Owner status ────────────────────────────────────────────────

/// `contract_ownerStatus`: call `owner()` when the verified ABI exposes
/// it, and decide whether ownership is renounced.
///
/// Missing ABI is a finding, not a failure: the item reports
/// `hasOwnerFunction: false` with a null owner.
pub struct OwnerStatusTool {
    rpc: RpcClient,
}

impl OwnerStatusTool {
    /// Create the tool.
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl ToolExecutor for OwnerStatusTool {
    async fn execute(&self, ctx: &ToolContext<'_>) -> EvidenceItem {
        let tool = ToolName::ContractOwnerStatus;
        let title = "Owner status";
        let source_url = Some(self.rpc.url().to_string());

        let has_owner_function = ctx
            .ledger
            .source_abi()
            .map(|abi_json| abi::abi_has_function(&abi_json, "owner"))
            .unwrap_or(false);

        if !has_owner_function {
            return EvidenceItem::ok(
                tool,
                title,
                source_url,
                serde_json::json!({
                    "address": ctx.token_address,
                    "hasOwnerFunction": false,
                    "owner": null,
                    "renounced": null,
                }),
            );
        }

        match self.rpc.call(ctx.token_address, SELECTOR_OWNER).await {
            Ok(word) => match crate::providers::rpc::decode_address_word(&word) {
                Some(owner) => {
                    let renounced = abi::is_renounced_owner(&owner);
                    EvidenceItem::ok(
                        tool,
                        title,
                        source_url,
                        serde_json::json!({
                            "address": ctx.token_address,
                            "hasOwnerFunction": true,
                            "owner": owner,
                            "renounced": renounced,
                        }),
                    )
                }
                None => EvidenceItem::unavailable(
                    tool,
                    title,
                    source_url,
                    "owner() returned undecodable data",
                ),
            },
            Err(e) => EvidenceItem::unavailable(tool, title, source_url, e.to_string()),
        }
    }
}

// ── Capability scan ─────────────────────────────────────────────

/// `contract_capabilityScan`: risk-relevant flags from ABI function names.
/// Pure derivation over prior evidence; performs no fetches of its own.
pub struct CapabilityScanTool;

impl CapabilityScanTool {
    /// Create the tool.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolExecutor for CapabilityScanTool {
    async fn execute(&self, ctx: &ToolContext<'_>) -> EvidenceItem {
        let tool = ToolName::ContractCapabilityScan;
        let title = "Contract capabilities";

        let Some(abi_json) = ctx.ledger.source_abi() else {
            return EvidenceItem::unavailable(
                tool,
                title,
                None,
                "verified ABI not available (contract unverified or source lookup failed)",
            );
        };
        let is_proxy = ctx.ledger.source_is_proxy().unwrap_or(false);

        match abi::scan_capabilities(&abi_json, is_proxy) {
            Ok(flags) => {
                let mut data = serde_json::to_value(flags)
                    .unwrap_or_else(|_| serde_json::json!({}));
                if let Some(map) = data.as_object_mut() {
                    map.insert(
                        "address".to_string(),
                        serde_json::Value::String(ctx.token_address.to_string()),
                    );
                }
                EvidenceItem::ok(tool, title, None, data)
            }
            Err(e) => EvidenceItem::unavailable(
                tool,
                title,
                None,
                format!("could not parse verified ABI: {e}"),
            ),
        }
    }
}
