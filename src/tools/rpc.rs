//! RPC-backed tools: bytecode probe and ERC-20 metadata.

use async_trait::async_trait;

use crate::evidence::{EvidenceItem, ToolName};
use crate::providers::rpc::{
    self, RpcClient, SELECTOR_DECIMALS, SELECTOR_NAME, SELECTOR_SYMBOL, SELECTOR_TOTAL_SUPPLY,
};

use super::{ToolContext, ToolExecutor};

/// How much of the bytecode is kept in evidence for eyeballing.
const BYTECODE_PREVIEW_HEX_CHARS: usize = 64;

// ── Bytecode ────────────────────────────────────────────────────

/// `rpc_getBytecode`: does the address actually hold a contract, and how
/// big is it.
pub struct BytecodeTool {
    rpc: RpcClient,
}

impl BytecodeTool {
    /// Create the tool.
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl ToolExecutor for BytecodeTool {
    async fn execute(&self, ctx: &ToolContext<'_>) -> EvidenceItem {
        let tool = ToolName::RpcGetBytecode;
        let title = "Contract bytecode";
        let source_url = Some(self.rpc.url().to_string());

        match self.rpc.get_code(ctx.token_address).await {
            Ok(code) => {
                let bare = code.strip_prefix("0x").unwrap_or(&code);
                let has_code = !bare.is_empty();
                let size_bytes = bare.len() / 2;
                let preview = if has_code {
                    Some(format!(
                        "0x{}",
                        &bare[..BYTECODE_PREVIEW_HEX_CHARS.min(bare.len())]
                    ))
                } else {
                    None
                };
                EvidenceItem::ok(
                    tool,
                    title,
                    source_url,
                    serde_json::json!({
                        "address": ctx.token_address,
                        "hasCode": has_code,
                        "bytecodeSizeBytes": size_bytes,
                        "bytecodePreview": preview,
                    }),
                )
            }
            Err(e) => EvidenceItem::unavailable(tool, title, source_url, e.to_string()),
        }
    }
}

// ── ERC-20 metadata ─────────────────────────────────────────────

/// `rpc_getErc20Metadata`: name, symbol, decimals, and total supply via
/// four concurrent `eth_call`s.
pub struct Erc20MetadataTool {
    rpc: RpcClient,
}

impl Erc20MetadataTool {
    /// Create the tool.
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl ToolExecutor for Erc20MetadataTool {
    async fn execute(&self, ctx: &ToolContext<'_>) -> EvidenceItem {
        let tool = ToolName::RpcGetErc20Metadata;
        let title = "ERC-20 metadata";
        let source_url = Some(self.rpc.url().to_string());
        let address = ctx.token_address;

        let (name_res, symbol_res, decimals_res, supply_res) = tokio::join!(
            self.rpc.call(address, SELECTOR_NAME),
            self.rpc.call(address, SELECTOR_SYMBOL),
            self.rpc.call(address, SELECTOR_DECIMALS),
            self.rpc.call(address, SELECTOR_TOTAL_SUPPLY),
        );

        // A token that answers none of the four calls is not an ERC-20 we
        // can describe; a partial answer is still evidence.
        if let (Err(name_err), Err(_), Err(_), Err(_)) =
            (&name_res, &symbol_res, &decimals_res, &supply_res)
        {
            return EvidenceItem::unavailable(tool, title, source_url, name_err.to_string());
        }

        let name = name_res.ok().as_deref().and_then(rpc::decode_abi_string);
        let symbol = symbol_res.ok().as_deref().and_then(rpc::decode_abi_string);
        let decimals = decimals_res.ok().as_deref().and_then(rpc::decode_u32);
        let total_supply = supply_res
            .ok()
            .as_deref()
            .and_then(rpc::decode_uint)
            .map(|n| n.to_string());

        EvidenceItem::ok(
            tool,
            title,
            source_url,
            serde_json::json!({
                "address": address,
                "name": name,
                "symbol": symbol,
                "decimals": decimals,
                "totalSupply": total_supply,
            }),
        )
    }
}
