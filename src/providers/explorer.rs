//! Block-explorer client (Etherscan-style v2 API, pinned to Base).
//!
//! Two lookups: verified source/ABI/proxy info and the contract-creation
//! row. The v2 API wraps everything in a `{status, message, result}`
//! envelope; `status == "0"` with a string result is an upstream "no data"
//! error whose message is preserved verbatim.

use serde::Deserialize;
use serde_json::Value;

use crate::config::CHAIN_ID;

use super::{check_http_response, ProviderError, DEFAULT_TIMEOUT};

/// Sentinel the explorer returns in the `ABI` field for unverified
/// contracts.
const UNVERIFIED_ABI: &str = "Contract source code not verified";

// ── Results ─────────────────────────────────────────────────────

/// Verified-source information for a contract.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// Whether the explorer has verified source for this address.
    pub verified: bool,
    /// Contract name, when verified.
    pub contract_name: Option<String>,
    /// Compiler version string, when verified.
    pub compiler_version: Option<String>,
    /// Declared license, when verified.
    pub license: Option<String>,
    /// Whether the explorer flags this contract as a proxy.
    pub is_proxy: bool,
    /// Implementation address behind the proxy, when flagged.
    pub implementation: Option<String>,
    /// Raw ABI JSON, when verified.
    pub abi: Option<String>,
    /// The exact URL queried.
    pub source_url: String,
}

/// Contract-creation row: who deployed the contract and in which
/// transaction.
#[derive(Debug, Clone)]
pub struct ContractCreation {
    /// Deployer address, lowercased.
    pub deployer_address: String,
    /// Creation transaction hash.
    pub tx_hash: String,
    /// The exact URL queried.
    pub source_url: String,
}

// ── Wire types (pub for integration testing) ────────────────────

/// The explorer's `{status, message, result}` envelope.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct ExplorerEnvelope {
    /// `"1"` for success, `"0"` for errors and empty results.
    pub status: String,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Result payload; a string when `status == "0"`.
    pub result: Value,
}

/// Unwrap the envelope, mapping `status == "0"` string results to
/// [`ProviderError::Upstream`] with the upstream message.
///
/// # Errors
///
/// Returns `ProviderError::Parse` for malformed envelopes and
/// `ProviderError::Upstream` for envelope-level errors.
#[doc(hidden)]
pub fn unwrap_envelope(body: &str) -> Result<Value, ProviderError> {
    let envelope: ExplorerEnvelope =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    if envelope.status == "0" {
        if let Value::String(msg) = &envelope.result {
            return Err(ProviderError::Upstream(msg.clone()));
        }
        return Err(ProviderError::Upstream(if envelope.message.is_empty() {
            "explorer returned status 0".to_string()
        } else {
            envelope.message
        }));
    }
    Ok(envelope.result)
}

/// Parse the first row of a `getsourcecode` result.
///
/// # Errors
///
/// Returns `ProviderError::Parse` when the result array is empty or
/// malformed.
#[doc(hidden)]
pub fn parse_source_info(result: &Value, source_url: String) -> Result<SourceInfo, ProviderError> {
    let row = result
        .get(0)
        .ok_or_else(|| ProviderError::Parse("empty getsourcecode result".to_string()))?;

    let field = |key: &str| -> Option<String> {
        row.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let abi_raw = field("ABI");
    let verified = abi_raw.as_deref().is_some_and(|a| a != UNVERIFIED_ABI);
    let is_proxy = field("Proxy").as_deref() == Some("1");

    Ok(SourceInfo {
        verified,
        contract_name: field("ContractName"),
        compiler_version: field("CompilerVersion"),
        license: field("LicenseType"),
        is_proxy,
        implementation: field("Implementation").map(|a| a.to_lowercase()),
        abi: if verified { abi_raw } else { None },
        source_url,
    })
}

/// Parse the first row of a `getcontractcreation` result.
///
/// # Errors
///
/// Returns `ProviderError::Parse` when the row is missing expected fields.
#[doc(hidden)]
pub fn parse_contract_creation(
    result: &Value,
    source_url: String,
) -> Result<ContractCreation, ProviderError> {
    let row = result
        .get(0)
        .ok_or_else(|| ProviderError::Parse("empty getcontractcreation result".to_string()))?;
    let deployer = row
        .get("contractCreator")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProviderError::Parse("missing contractCreator".to_string()))?;
    let tx_hash = row
        .get("txHash")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProviderError::Parse("missing txHash".to_string()))?;
    Ok(ContractCreation {
        deployer_address: deployer.to_lowercase(),
        tx_hash: tx_hash.to_lowercase(),
        source_url,
    })
}

// ── Client ──────────────────────────────────────────────────────

/// Explorer API client.
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ExplorerClient {
    /// Create a client sharing the process-global HTTP client.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Build the query URL for a contract action. The key is appended only
    /// at request time so this URL is safe to store as `sourceUrl`.
    pub fn action_url(&self, action: &str, address: &str) -> String {
        format!(
            "{}?chainid={CHAIN_ID}&module=contract&action={action}&address={address}",
            self.base_url
        )
    }

    async fn fetch(&self, action: &str, address: &str) -> Result<(Value, String), ProviderError> {
        let source_url = self.action_url(action, address);
        let url = format!("{source_url}&apikey={}", self.api_key);
        let response = self
            .client
            .get(url)
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await?;
        let body = check_http_response(response).await?;
        let result = unwrap_envelope(&body)?;
        Ok((result, source_url))
    }

    /// Fetch verified source / ABI / proxy info.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport, envelope, or parse failure.
    pub async fn get_source_info(&self, address: &str) -> Result<SourceInfo, ProviderError> {
        let (result, source_url) = self.fetch("getsourcecode", address).await?;
        parse_source_info(&result, source_url)
    }

    /// Fetch the contract-creation row (deployer + tx hash).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport, envelope, or parse failure.
    pub async fn get_contract_creation(
        &self,
        address: &str,
    ) -> Result<ContractCreation, ProviderError> {
        let (result, source_url) = self.fetch("getcontractcreation", address).await?;
        parse_contract_creation(&result, source_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_envelope_success() {
        let body = r#"{"status":"1","message":"OK","result":[{"ABI":"[]"}]}"#;
        let result = unwrap_envelope(body).expect("ok");
        assert!(result.is_array());
    }

    #[test]
    fn test_unwrap_envelope_status_zero_string_result() {
        let body = r#"{"status":"0","message":"NOTOK","result":"Max daily rate limit reached"}"#;
        let err = unwrap_envelope(body).expect_err("should fail");
        assert_eq!(err.to_string(), "Max daily rate limit reached");
        assert!(err.is_quota());
    }

    #[test]
    fn test_parse_source_info_verified() {
        let result = serde_json::json!([{
            "ABI": "[{\"type\":\"function\",\"name\":\"mint\"}]",
            "ContractName": "PepeToken",
            "CompilerVersion": "v0.8.24+commit.e11b9ed9",
            "LicenseType": "MIT",
            "Proxy": "1",
            "Implementation": "0xABC0000000000000000000000000000000000001"
        }]);
        let info = parse_source_info(&result, "https://x".to_string()).expect("parse");
        assert!(info.verified);
        assert!(info.is_proxy);
        assert_eq!(info.contract_name.as_deref(), Some("PepeToken"));
        assert_eq!(
            info.implementation.as_deref(),
            Some("0xabc0000000000000000000000000000000000001")
        );
        assert!(info.abi.is_some());
    }

    #[test]
    fn test_parse_source_info_unverified() {
        let result = serde_json::json!([{
            "ABI": "Contract source code not verified",
            "ContractName": "",
            "Proxy": "0"
        }]);
        let info = parse_source_info(&result, "https://x".to_string()).expect("parse");
        assert!(!info.verified);
        assert!(info.abi.is_none());
        assert!(info.contract_name.is_none());
        assert!(!info.is_proxy);
    }

    #[test]
    fn test_parse_contract_creation_lowercases() {
        let result = serde_json::json!([{
            "contractAddress": "0xF43eB8de897FBc7F2502483B2bEF7bb9EA179229",
            "contractCreator": "0xDEpLoYeR00000000000000000000000000000001",
            "txHash": "0xAB12"
        }]);
        let creation = parse_contract_creation(&result, "https://x".to_string()).expect("parse");
        assert_eq!(
            creation.deployer_address,
            "0xdeployer00000000000000000000000000000001"
        );
        assert_eq!(creation.tx_hash, "0xab12");
    }
}
