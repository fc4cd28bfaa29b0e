//! Honeypot simulator client (honeypot.is-style API, pinned to Base).
//!
//! The upstream simulates a buy, a sell, and a transfer against a fork and
//! reports whether the token lets holders exit, plus effective taxes and
//! gas. Gets the longer 12s timeout because a simulation runs upstream.

use serde::Deserialize;

use crate::config::CHAIN_ID;

use super::{check_http_response, ProviderError, HONEYPOT_TIMEOUT};

/// Default simulator endpoint.
pub const DEFAULT_HONEYPOT_BASE: &str = "https://api.honeypot.is/v2/IsHoneypot";

// ── Wire types (pub for integration testing) ────────────────────

/// Simulator response, reduced to the fields the scanner consumes.
#[doc(hidden)]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoneypotResponse {
    /// Whether the fork simulation itself succeeded.
    #[serde(default)]
    pub simulation_success: Option<bool>,
    /// The verdict block.
    #[serde(default)]
    pub honeypot_result: Option<HoneypotVerdict>,
    /// Tax and gas details.
    #[serde(default)]
    pub simulation_result: Option<SimulationResult>,
    /// Pair the simulation ran against.
    #[serde(default)]
    pub pair: Option<PairMeta>,
    /// Upstream error message when the simulation could not run.
    #[serde(default)]
    pub simulation_error: Option<String>,
}

/// The honeypot verdict.
#[doc(hidden)]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoneypotVerdict {
    /// True when holders cannot sell.
    pub is_honeypot: bool,
    /// Upstream's reason for the verdict.
    #[serde(default)]
    pub honeypot_reason: Option<String>,
}

/// Effective taxes and gas from the simulation.
#[doc(hidden)]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    #[serde(default)]
    pub buy_tax: Option<f64>,
    #[serde(default)]
    pub sell_tax: Option<f64>,
    #[serde(default)]
    pub transfer_tax: Option<f64>,
    #[serde(default)]
    pub buy_gas: Option<String>,
    #[serde(default)]
    pub sell_gas: Option<String>,
}

/// Metadata for the simulated pair.
#[doc(hidden)]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairMeta {
    #[serde(default)]
    pub pair: Option<PairInner>,
    #[serde(default)]
    pub liquidity: Option<f64>,
}

/// Inner pair identity.
#[doc(hidden)]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairInner {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Parse a simulator response body.
///
/// # Errors
///
/// Returns `ProviderError::Parse` when the body is not the expected shape.
#[doc(hidden)]
pub fn parse_simulation(body: &str) -> Result<HoneypotResponse, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))
}

// ── Client ──────────────────────────────────────────────────────

/// Honeypot simulator client.
#[derive(Debug, Clone)]
pub struct HoneypotClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HoneypotClient {
    /// Create a client sharing the process-global HTTP client. The API key
    /// is optional; without one the upstream applies a public rate limit.
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_HONEYPOT_BASE.to_string(),
            api_key,
        }
    }

    /// URL for a token's simulation.
    pub fn simulation_url(&self, address: &str) -> String {
        format!("{}?address={address}&chainID={CHAIN_ID}", self.base_url)
    }

    /// Run the buy/sell/transfer simulation for a token.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport or parse failure.
    pub async fn get_simulation(&self, address: &str) -> Result<HoneypotResponse, ProviderError> {
        let mut request = self
            .client
            .get(self.simulation_url(address))
            .timeout(HONEYPOT_TIMEOUT);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key);
        }
        let response = request.send().await?;
        let body = check_http_response(response).await?;
        parse_simulation(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulation_clean_token() {
        let body = r#"{
            "simulationSuccess": true,
            "honeypotResult": {"isHoneypot": false},
            "simulationResult": {"buyTax": 2.0, "sellTax": 3.0, "transferTax": 0.0,
                                 "buyGas": "142000", "sellGas": "131000"},
            "pair": {"pair": {"address": "0xpair", "name": "PEPE/WETH"}, "liquidity": 120000.0}
        }"#;
        let parsed = parse_simulation(body).expect("parse");
        assert_eq!(parsed.simulation_success, Some(true));
        let verdict = parsed.honeypot_result.expect("verdict");
        assert!(!verdict.is_honeypot);
        let sim = parsed.simulation_result.expect("sim");
        assert_eq!(sim.buy_tax, Some(2.0));
        assert_eq!(sim.sell_tax, Some(3.0));
    }

    #[test]
    fn test_parse_simulation_honeypot_with_reason() {
        let body = r#"{
            "simulationSuccess": true,
            "honeypotResult": {"isHoneypot": true, "honeypotReason": "Sell reverts"}
        }"#;
        let parsed = parse_simulation(body).expect("parse");
        let verdict = parsed.honeypot_result.expect("verdict");
        assert!(verdict.is_honeypot);
        assert_eq!(verdict.honeypot_reason.as_deref(), Some("Sell reverts"));
    }

    #[test]
    fn test_parse_simulation_failure_carries_error() {
        let body = r#"{"simulationSuccess": false, "simulationError": "No pair found"}"#;
        let parsed = parse_simulation(body).expect("parse");
        assert_eq!(parsed.simulation_success, Some(false));
        assert_eq!(parsed.simulation_error.as_deref(), Some("No pair found"));
        assert!(parsed.honeypot_result.is_none());
    }

    #[test]
    fn test_simulation_url_pins_chain() {
        let client = HoneypotClient::new(reqwest::Client::new(), None);
        let url = client.simulation_url("0xabc");
        assert!(url.contains("chainID=8453"));
        assert!(url.contains("address=0xabc"));
    }
}
