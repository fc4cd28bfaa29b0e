//! DEX aggregator client (Dexscreener token-pairs API).

use serde::{Deserialize, Serialize};

use super::{check_http_response, ProviderError, DEFAULT_TIMEOUT};

// ── Wire types (pub for integration testing) ────────────────────

/// One trading pair as reported by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairRecord {
    /// DEX identifier (e.g. `uniswap`, `aerodrome`).
    #[serde(default)]
    pub dex_id: Option<String>,
    /// Aggregator page for this pair.
    #[serde(default)]
    pub url: Option<String>,
    /// On-chain pair contract address.
    pub pair_address: String,
    /// The token under scan.
    #[serde(default)]
    pub base_token: Option<TokenRef>,
    /// The paired token (usually WETH or a stable).
    #[serde(default)]
    pub quote_token: Option<TokenRef>,
    /// Spot price in USD, as a decimal string.
    #[serde(default)]
    pub price_usd: Option<String>,
    /// 24h transaction counts.
    #[serde(default)]
    pub txns: Option<TxnWindows>,
    /// 24h traded volume.
    #[serde(default)]
    pub volume: Option<WindowedMetric>,
    /// 24h price change percent.
    #[serde(default)]
    pub price_change: Option<WindowedMetric>,
    /// Pooled liquidity.
    #[serde(default)]
    pub liquidity: Option<Liquidity>,
    /// Pair creation time, unix millis.
    #[serde(default)]
    pub pair_created_at: Option<i64>,
}

/// A token reference inside a pair record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRef {
    /// Token contract address.
    pub address: String,
    /// Token name.
    #[serde(default)]
    pub name: Option<String>,
    /// Token symbol.
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Buy/sell counts for the 24h window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnWindows {
    /// 24h bucket.
    #[serde(default)]
    pub h24: Option<TxnCounts>,
}

/// Buy/sell counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxnCounts {
    #[serde(default)]
    pub buys: Option<i64>,
    #[serde(default)]
    pub sells: Option<i64>,
}

/// A metric reported per time window; only the 24h bucket is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowedMetric {
    /// 24h bucket.
    #[serde(default)]
    pub h24: Option<f64>,
}

/// Pooled liquidity in USD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidity {
    /// USD value of pooled assets.
    #[serde(default)]
    pub usd: Option<f64>,
}

/// Parse the token-pairs response body (a bare JSON array).
///
/// # Errors
///
/// Returns `ProviderError::Parse` when the body is not a pair array.
#[doc(hidden)]
pub fn parse_pairs(body: &str) -> Result<Vec<PairRecord>, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))
}

/// Pick the pair with the deepest USD liquidity.
pub fn best_pair(pairs: &[PairRecord]) -> Option<&PairRecord> {
    pairs.iter().max_by(|a, b| {
        let la = a.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
        let lb = b.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
        la.total_cmp(&lb)
    })
}

// ── Client ──────────────────────────────────────────────────────

/// Dexscreener REST client.
#[derive(Debug, Clone)]
pub struct DexClient {
    client: reqwest::Client,
    base_url: String,
}

impl DexClient {
    /// Create a client sharing the process-global HTTP client.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// URL for a token's pair list on the configured network.
    pub fn pairs_url(&self, chain: &str, address: &str) -> String {
        format!("{}/token-pairs/v1/{chain}/{address}", self.base_url)
    }

    /// Fetch all pairs for a token.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport or parse failure.
    pub async fn get_token_pairs(
        &self,
        chain: &str,
        address: &str,
    ) -> Result<Vec<PairRecord>, ProviderError> {
        let response = self
            .client
            .get(self.pairs_url(chain, address))
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await?;
        let body = check_http_response(response).await?;
        parse_pairs(&body)
    }
}
