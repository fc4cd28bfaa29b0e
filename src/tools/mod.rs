//! Tool registry: the closed table mapping a [`ToolName`] to its executor.
//!
//! Each executor receives the token address plus the evidence collected so
//! far, and always hands back an [`EvidenceItem`] — failures become
//! `unavailable` items with the error preserved, never panics or errors
//! that could escape past the pipeline runner.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, CHAIN};
use crate::evidence::{EvidenceItem, EvidenceLedger, ToolName};
use crate::providers::dexscreener::DexClient;
use crate::providers::explorer::ExplorerClient;
use crate::providers::holders::HoldersClient;
use crate::providers::honeypot::HoneypotClient;
use crate::providers::rpc::RpcClient;

pub mod explorer;
pub mod holders;
pub mod market;
pub mod rpc;

/// How many holders the top-holders tool requests.
pub const TOP_HOLDERS_LIMIT: usize = 10;

/// What an executor gets to work with.
pub struct ToolContext<'a> {
    /// Lowercase token contract address under scan.
    pub token_address: &'a str,
    /// Evidence collected by earlier steps. Executors read prior results
    /// through the ledger's typed accessors instead of refetching.
    pub ledger: &'a EvidenceLedger,
}

/// A single investigation tool.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run the tool. Must not panic; every failure path returns an
    /// `unavailable` evidence item carrying the error string.
    async fn execute(&self, ctx: &ToolContext<'_>) -> EvidenceItem;
}

/// Registry owning the tool table for the process lifetime.
pub struct ToolRegistry {
    table: HashMap<ToolName, Arc<dyn ToolExecutor>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.available())
            .finish()
    }
}

impl ToolRegistry {
    /// An empty registry; used by tests that register stubs.
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Build the full registry for the current configuration. Tools whose
    /// provider is not configured are simply absent.
    pub fn build(config: &Config, http: reqwest::Client, rpc_client: RpcClient) -> Self {
        let mut registry = Self::empty();

        registry.register(
            ToolName::RpcGetBytecode,
            Arc::new(rpc::BytecodeTool::new(rpc_client.clone())),
        );
        registry.register(
            ToolName::RpcGetErc20Metadata,
            Arc::new(rpc::Erc20MetadataTool::new(rpc_client.clone())),
        );

        let dex = DexClient::new(http.clone(), config.dex_api_base.clone());
        registry.register(
            ToolName::DexscreenerGetPairs,
            Arc::new(market::DexPairsTool::new(dex, CHAIN)),
        );

        let honeypot = HoneypotClient::new(http.clone(), config.honeypot_api_key.clone());
        registry.register(
            ToolName::HoneypotGetSimulation,
            Arc::new(market::HoneypotTool::new(honeypot)),
        );

        registry.register(
            ToolName::LpV2LockStatus,
            Arc::new(market::LpLockTool::new(rpc_client.clone())),
        );

        if let Some(explorer_config) = &config.explorer {
            let explorer = ExplorerClient::new(
                http.clone(),
                explorer_config.base_url.clone(),
                explorer_config.api_key.clone(),
            );
            registry.register(
                ToolName::BasescanGetSourceInfo,
                Arc::new(explorer::SourceInfoTool::new(explorer.clone())),
            );
            registry.register(
                ToolName::BasescanGetContractCreation,
                Arc::new(explorer::ContractCreationTool::new(explorer)),
            );
            registry.register(
                ToolName::ContractOwnerStatus,
                Arc::new(explorer::OwnerStatusTool::new(rpc_client.clone())),
            );
            registry.register(
                ToolName::ContractCapabilityScan,
                Arc::new(explorer::CapabilityScanTool::new()),
            );
        }

        if config.holders_enabled() {
            if let Some(holders_config) = &config.holders {
                let client = HoldersClient::new(
                    http,
                    holders_config.endpoint.clone(),
                    holders_config.token.clone(),
                );
                registry.register(
                    ToolName::HoldersGetTopHolders,
                    Arc::new(holders::TopHoldersTool::new(
                        client,
                        config.holders_mode,
                        config.holders_probe_cap,
                        config.holders_min_rows,
                    )),
                );
            }
        }

        registry
    }

    /// Register (or replace) an executor.
    pub fn register(&mut self, tool: ToolName, executor: Arc<dyn ToolExecutor>) {
        self.table.insert(tool, executor);
    }

    /// Look up the executor for a tool.
    pub fn get(&self, tool: ToolName) -> Option<Arc<dyn ToolExecutor>> {
        self.table.get(&tool).cloned()
    }

    /// Tools available under the current configuration, in canonical
    /// baseline-first order.
    pub fn available(&self) -> Vec<ToolName> {
        ToolName::ALL
            .into_iter()
            .filter(|t| self.table.contains_key(t))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn config_with(extra: &'static [(&'static str, &'static str)]) -> Config {
        Config::load_with(|key| {
            if let Some((_, v)) = extra.iter().find(|(k, _)| *k == key) {
                return Some(v.to_string());
            }
            match key {
                "DATABASE_URL" => Some("sqlite::memory:".to_string()),
                "CHAIN_RPC_URL" => Some("https://mainnet.base.org".to_string()),
                _ => None,
            }
        })
        .expect("config")
    }

    fn build_registry(config: &Config) -> ToolRegistry {
        let http = reqwest::Client::new();
        let rpc_client = RpcClient::new(http.clone(), config.chain_rpc_url.clone());
        ToolRegistry::build(config, http, rpc_client)
    }

    #[test]
    fn test_minimal_config_registers_baseline_tools() {
        let registry = build_registry(&config_with(&[]));
        let available = registry.available();
        assert_eq!(
            available,
            vec![
                ToolName::RpcGetBytecode,
                ToolName::RpcGetErc20Metadata,
                ToolName::DexscreenerGetPairs,
                ToolName::HoneypotGetSimulation,
                ToolName::LpV2LockStatus,
            ]
        );
    }

    #[test]
    fn test_explorer_key_adds_explorer_tools() {
        let registry = build_registry(&config_with(&[("EXPLORER_API_KEY", "key")]));
        let available = registry.available();
        assert!(available.contains(&ToolName::BasescanGetSourceInfo));
        assert!(available.contains(&ToolName::ContractCapabilityScan));
        assert!(available.contains(&ToolName::ContractOwnerStatus));
        assert!(!available.contains(&ToolName::HoldersGetTopHolders));
    }

    #[test]
    fn test_holders_token_adds_holders_tool() {
        let registry = build_registry(&config_with(&[("HOLDERS_API_TOKEN", "bq")]));
        assert!(registry
            .available()
            .contains(&ToolName::HoldersGetTopHolders));
    }

    #[test]
    fn test_holders_mode_off_suppresses_tool() {
        let registry = build_registry(&config_with(&[
            ("HOLDERS_API_TOKEN", "bq"),
            ("HOLDERS_MODE", "off"),
        ]));
        assert!(!registry
            .available()
            .contains(&ToolName::HoldersGetTopHolders));
    }
}
