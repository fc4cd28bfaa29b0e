//! Chain JSON-RPC 2.0 client.
//!
//! Only two methods are used: `eth_getCode` for the contract preflight and
//! `eth_call` for read-only contract probes. Call data is built from the
//! well-known four-byte selectors below; return data is decoded with the
//! small helpers at the bottom (single words, addresses, ABI strings).

use num_bigint::BigUint;
use num_traits::Num;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{check_http_response, ProviderError, DEFAULT_TIMEOUT};

// ── Well-known byte sequences ───────────────────────────────────

/// The all-zeros address, a common burn target.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
/// The `0x…dead` sentinel, the other common burn target.
pub const DEAD_ADDRESS: &str = "0x000000000000000000000000000000000000dead";

/// `name()`
pub const SELECTOR_NAME: &str = "0x06fdde03";
/// `symbol()`
pub const SELECTOR_SYMBOL: &str = "0x95d89b41";
/// `decimals()`
pub const SELECTOR_DECIMALS: &str = "0x313ce567";
/// `totalSupply()`
pub const SELECTOR_TOTAL_SUPPLY: &str = "0x18160ddd";
/// `balanceOf(address)`
pub const SELECTOR_BALANCE_OF: &str = "0x70a08231";
/// `getReserves()` on a UniswapV2-style pair.
pub const SELECTOR_GET_RESERVES: &str = "0x0902f1ac";
/// `owner()`
pub const SELECTOR_OWNER: &str = "0x8da5cb5b";

// ── Wire types (pub for integration testing) ────────────────────

/// JSON-RPC 2.0 request envelope.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct RpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Request id.
    pub id: u64,
    /// Method name.
    pub method: &'static str,
    /// Positional params.
    pub params: Value,
}

/// JSON-RPC 2.0 response envelope.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    /// Result value on success.
    pub result: Option<Value>,
    /// Error object on failure.
    pub error: Option<RpcErrorObject>,
}

/// JSON-RPC error object.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
}

/// Extract the hex result string from a JSON-RPC response body.
///
/// # Errors
///
/// Returns `ProviderError::Rpc` for JSON-RPC error objects and
/// `ProviderError::Parse` for malformed envelopes.
#[doc(hidden)]
pub fn parse_rpc_result(body: &str) -> Result<String, ProviderError> {
    let resp: RpcResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    if let Some(err) = resp.error {
        return Err(ProviderError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    match resp.result {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ProviderError::Parse(format!(
            "expected hex string result, got {other}"
        ))),
        None => Err(ProviderError::Parse("missing result".to_string())),
    }
}

// ── Client ──────────────────────────────────────────────────────

/// JSON-RPC client for the configured chain node.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Create a client for `url` sharing the process-global HTTP client.
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// The node URL, used as `sourceUrl` on RPC-backed evidence.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, method: &'static str, params: Value) -> Result<String, ProviderError> {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let response = self
            .client
            .post(&self.url)
            .timeout(DEFAULT_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let payload = check_http_response(response).await?;
        parse_rpc_result(&payload)
    }

    /// `eth_getCode(address, "latest")` — returns the bytecode hex string
    /// (`"0x"` for externally owned accounts).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport, envelope, or node errors.
    pub async fn get_code(&self, address: &str) -> Result<String, ProviderError> {
        self.request("eth_getCode", serde_json::json!([address, "latest"]))
            .await
    }

    /// `eth_call({to, data}, "latest")` — returns the raw return data hex.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport, envelope, or node errors
    /// (including reverts, which surface as `Chain RPC error (code): msg`).
    pub async fn call(&self, to: &str, data: &str) -> Result<String, ProviderError> {
        self.request(
            "eth_call",
            serde_json::json!([{ "to": to, "data": data }, "latest"]),
        )
        .await
    }
}

// ── Calldata encoding ───────────────────────────────────────────

/// Encode a call to a `fn(address)` method: selector plus the address
/// left-padded to a 32-byte word.
pub fn encode_address_call(selector: &str, address: &str) -> String {
    let bare = address.trim_start_matches("0x").to_lowercase();
    format!("{selector}{:0>64}", bare)
}

// ── Return-data decoding ────────────────────────────────────────

/// Strip the `0x` prefix, if present.
fn strip0x(hex_str: &str) -> &str {
    hex_str.strip_prefix("0x").unwrap_or(hex_str)
}

/// Decode an unsigned integer from return data (first 32-byte word).
pub fn decode_uint(hex_data: &str) -> Option<BigUint> {
    let bare = strip0x(hex_data);
    if bare.is_empty() {
        return None;
    }
    let word = bare.get(..64.min(bare.len()))?;
    BigUint::from_str_radix(word, 16).ok()
}

/// Decode a small unsigned integer (e.g. `decimals()`).
pub fn decode_u32(hex_data: &str) -> Option<u32> {
    let n = decode_uint(hex_data)?;
    u32::try_from(n).ok()
}

/// Decode an address from a single 32-byte return word: the last 20 bytes,
/// lowercased.
pub fn decode_address_word(hex_data: &str) -> Option<String> {
    let bare = strip0x(hex_data);
    if bare.len() < 64 {
        return None;
    }
    let word = bare.get(..64)?;
    let addr = word.get(24..64)?;
    if !addr.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", addr.to_lowercase()))
}

/// Decode an ABI-encoded `string` return value.
///
/// Handles the standard dynamic encoding (offset word, length word, data)
/// and the legacy single-word `bytes32` variant some old tokens use.
pub fn decode_abi_string(hex_data: &str) -> Option<String> {
    let bare = strip0x(hex_data);
    if bare.is_empty() {
        return None;
    }
    let bytes = hex::decode(bare).ok()?;

    // Legacy bytes32: one word, right-padded with zeros.
    if bytes.len() == 32 {
        let trimmed: Vec<u8> = bytes.iter().copied().take_while(|b| *b != 0).collect();
        return String::from_utf8(trimmed).ok().map(|s| s.trim().to_string());
    }

    // Dynamic string: word 0 is the offset to the length word.
    if bytes.len() < 64 {
        return None;
    }
    let offset = usize::try_from(BigUint::from_bytes_be(bytes.get(..32)?)).ok()?;
    let len_end = offset.checked_add(32)?;
    let length = usize::try_from(BigUint::from_bytes_be(bytes.get(offset..len_end)?)).ok()?;
    let data_end = len_end.checked_add(length)?;
    let data = bytes.get(len_end..data_end)?;
    String::from_utf8(data.to_vec()).ok().map(|s| s.trim().to_string())
}
