//! Top-holders tool over the indexed GraphQL dataset.

use async_trait::async_trait;
use serde_json::Value;

use crate::analyzers::holders_math::compute_holder_shares;
use crate::config::HoldersMode;
use crate::evidence::{EvidenceItem, ToolName};
use crate::providers::holders::HoldersClient;

use super::{ToolContext, ToolExecutor, TOP_HOLDERS_LIMIT};

/// `holders_getTopHolders`: top-N holders with supply-percent math.
///
/// Reads total supply and decimals from the prior ERC-20 metadata evidence
/// so absolute percentages can be computed without refetching.
pub struct TopHoldersTool {
    client: HoldersClient,
    mode: HoldersMode,
    probe_cap: usize,
    min_rows: usize,
}

impl TopHoldersTool {
    /// Create the tool.
    pub fn new(
        client: HoldersClient,
        mode: HoldersMode,
        probe_cap: usize,
        min_rows: usize,
    ) -> Self {
        Self {
            client,
            mode,
            probe_cap,
            min_rows,
        }
    }
}

#[async_trait]
impl ToolExecutor for TopHoldersTool {
    async fn execute(&self, ctx: &ToolContext<'_>) -> EvidenceItem {
        let tool = ToolName::HoldersGetTopHolders;
        let title = "Top holders";
        let source_url = Some(self.client.endpoint().to_string());

        let fetch = match self
            .client
            .fetch_top_holders(
                ctx.token_address,
                TOP_HOLDERS_LIMIT,
                self.mode.day_offsets(),
                self.probe_cap,
                self.min_rows,
            )
            .await
        {
            Ok(fetch) => fetch,
            Err(e) => {
                return EvidenceItem::unavailable(tool, title, source_url, e.to_string());
            }
        };

        let total_supply = ctx.ledger.erc20_total_supply();
        let decimals = ctx.ledger.erc20_decimals();
        let breakdown = compute_holder_shares(
            &fetch.rows,
            fetch.method,
            total_supply.as_deref(),
            decimals,
        );

        let holders: Vec<Value> = breakdown
            .holders
            .iter()
            .map(|h| serde_json::to_value(h).unwrap_or_else(|_| serde_json::json!({})))
            .collect();

        EvidenceItem::ok(
            tool,
            title,
            source_url,
            serde_json::json!({
                "address": ctx.token_address,
                "method": fetch.method.as_str(),
                "snapshotDate": fetch.date,
                "holderCount": holders.len(),
                "holders": holders,
                "top5Pct": breakdown.top5_pct,
                "top10Pct": breakdown.top10_pct,
                "supplyPctAvailable": breakdown.holders.iter().any(|h| h.pct_of_supply.is_some()),
            }),
        )
    }
}
