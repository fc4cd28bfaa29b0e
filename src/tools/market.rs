//! Market-side tools: DEX pairs, honeypot simulation, and LP lock status.

use async_trait::async_trait;
use serde_json::Value;

use crate::analyzers::lp_lock;
use crate::evidence::{EvidenceItem, ToolName};
use crate::providers::dexscreener::{best_pair, DexClient, PairRecord};
use crate::providers::honeypot::HoneypotClient;
use crate::providers::rpc::RpcClient;

use super::{ToolContext, ToolExecutor};

// ── DEX pairs ───────────────────────────────────────────────────

/// `dexscreener_getPairs`: the token's trading pairs, plus the deepest
/// pool as `bestPair` for downstream steps.
pub struct DexPairsTool {
    dex: DexClient,
    chain: &'static str,
}

impl DexPairsTool {
    /// Create the tool.
    pub fn new(dex: DexClient, chain: &'static str) -> Self {
        Self { dex, chain }
    }
}

fn summarize_pair(pair: &PairRecord) -> Value {
    serde_json::json!({
        "dexId": &pair.dex_id,
        "pairAddress": pair.pair_address.to_lowercase(),
        "url": &pair.url,
        "quoteSymbol": pair.quote_token.as_ref().and_then(|t| t.symbol.clone()),
        "priceUsd": &pair.price_usd,
        "liquidityUsd": pair.liquidity.as_ref().and_then(|l| l.usd),
        "volume24h": pair.volume.as_ref().and_then(|v| v.h24),
        "priceChange24h": pair.price_change.as_ref().and_then(|p| p.h24),
        "txns24h": pair.txns.as_ref().and_then(|t| t.h24.as_ref()).map(|t| {
            serde_json::json!({ "buys": t.buys, "sells": t.sells })
        }),
        "pairCreatedAt": pair.pair_created_at,
    })
}

#[async_trait]
impl ToolExecutor for DexPairsTool {
    async fn execute(&self, ctx: &ToolContext<'_>) -> EvidenceItem {
        let tool = ToolName::DexscreenerGetPairs;
        let title = "DEX trading pairs";
        let source_url = Some(self.dex.pairs_url(self.chain, ctx.token_address));

        match self.dex.get_token_pairs(self.chain, ctx.token_address).await {
            Ok(pairs) => {
                let best = best_pair(&pairs).map(summarize_pair);
                let summaries: Vec<Value> = pairs.iter().map(summarize_pair).collect();
                EvidenceItem::ok(
                    tool,
                    title,
                    source_url,
                    serde_json::json!({
                        "address": ctx.token_address,
                        "pairCount": pairs.len(),
                        "pairs": summaries,
                        "bestPair": best,
                    }),
                )
            }
            Err(e) => EvidenceItem::unavailable(tool, title, source_url, e.to_string()),
        }
    }
}

// ── Honeypot simulation ─────────────────────────────────────────

/// `honeypot_getSimulation`: can holders actually sell, and at what tax.
pub struct HoneypotTool {
    honeypot: HoneypotClient,
}

impl HoneypotTool {
    /// Create the tool.
    pub fn new(honeypot: HoneypotClient) -> Self {
        Self { honeypot }
    }
}

#[async_trait]
impl ToolExecutor for HoneypotTool {
    async fn execute(&self, ctx: &ToolContext<'_>) -> EvidenceItem {
        let tool = ToolName::HoneypotGetSimulation;
        let title = "Honeypot simulation";
        let source_url = Some(self.honeypot.simulation_url(ctx.token_address));

        match self.honeypot.get_simulation(ctx.token_address).await {
            Ok(sim) => {
                let verdict = sim.honeypot_result.as_ref();
                let taxes = sim.simulation_result.as_ref();
                let pair = sim.pair.as_ref();
                EvidenceItem::ok(
                    tool,
                    title,
                    source_url,
                    serde_json::json!({
                        "address": ctx.token_address,
                        "simulationSuccess": sim.simulation_success,
                        "simulationError": sim.simulation_error,
                        "isHoneypot": verdict.map(|v| v.is_honeypot),
                        "honeypotReason": verdict.and_then(|v| v.honeypot_reason.clone()),
                        "buyTax": taxes.and_then(|t| t.buy_tax),
                        "sellTax": taxes.and_then(|t| t.sell_tax),
                        "transferTax": taxes.and_then(|t| t.transfer_tax),
                        "buyGas": taxes.and_then(|t| t.buy_gas.clone()),
                        "sellGas": taxes.and_then(|t| t.sell_gas.clone()),
                        "pairAddress": pair
                            .and_then(|p| p.pair.as_ref())
                            .and_then(|p| p.address.clone())
                            .map(|a| a.to_lowercase()),
                        "pairName": pair.and_then(|p| p.pair.as_ref()).and_then(|p| p.name.clone()),
                        "pairLiquidityUsd": pair.and_then(|p| p.liquidity),
                    }),
                )
            }
            Err(e) => EvidenceItem::unavailable(tool, title, source_url, e.to_string()),
        }
    }
}

// ── LP lock ─────────────────────────────────────────────────────

/// `lp_v2_lockStatus`: LP lock inference over the best pair found by the
/// DEX step.
///
/// Hard prerequisite: `dexscreener_getPairs` must have produced a best
/// pair. The deployer address from `basescan_getContractCreation` sharpens
/// the verdict when present but is not required.
pub struct LpLockTool {
    rpc: RpcClient,
}

impl LpLockTool {
    /// Create the tool.
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl ToolExecutor for LpLockTool {
    async fn execute(&self, ctx: &ToolContext<'_>) -> EvidenceItem {
        let tool = ToolName::LpV2LockStatus;
        let title = "LP lock status";
        let source_url = Some(self.rpc.url().to_string());

        let Some(pair_address) = ctx.ledger.best_pair_address() else {
            return EvidenceItem::unavailable(
                tool,
                title,
                None,
                "no DEX pair available to analyze (dexscreener_getPairs produced no best pair)",
            );
        };
        let deployer = ctx.ledger.deployer_address();

        match lp_lock::analyze_lp_lock(&self.rpc, &pair_address, deployer.as_deref()).await {
            Ok(analysis) => {
                let data = serde_json::to_value(&analysis)
                    .unwrap_or_else(|_| serde_json::json!({}));
                EvidenceItem::ok(tool, title, source_url, data)
            }
            Err(e) => EvidenceItem::unavailable(tool, title, source_url, e.to_string()),
        }
    }
}
