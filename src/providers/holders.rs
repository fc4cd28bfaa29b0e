//! Indexed-holder GraphQL client (Bitquery-style EAP dataset).
//!
//! Two queries against the time-indexed dataset:
//!
//! - **Primary** `TokenHolders(date, limit)` sorted by balance descending.
//!   The snapshot for "yesterday" is often still being built, so the client
//!   walks a ladder of past dates and stops at the first one that returns
//!   enough rows.
//! - **Fallback** `BalanceUpdates` ranked by USD-weighted sum, used when no
//!   date in the ladder produced enough rows.
//!
//! Quota responses (HTTP 402/429 or a quota-shaped GraphQL error) abort the
//! whole fetch without attempting the fallback: the fallback query would
//! burn the same exhausted quota.

use chrono::{Duration, Utc};
use serde_json::Value;

use super::{check_http_response, ProviderError, DEFAULT_TIMEOUT};

/// How the rows were obtained; drives whether absolute supply percentages
/// may be computed downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMethod {
    /// Point-in-time balance snapshot; amounts are token base units.
    TokenHolders,
    /// USD-weighted aggregation; amounts are pre-divided token units.
    BalanceUpdates,
}

impl FetchMethod {
    /// Wire name stored in evidence data.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TokenHolders => "token_holders",
            Self::BalanceUpdates => "balance_updates",
        }
    }
}

/// One holder row.
#[derive(Debug, Clone)]
pub struct HolderRow {
    /// Holder address, lowercased.
    pub address: String,
    /// Balance as a decimal string. Integer base units for the primary
    /// query; pre-divided token units for the fallback.
    pub amount: String,
    /// USD-weighted sum, fallback query only.
    pub usd: Option<f64>,
}

/// Result of a holders fetch.
#[derive(Debug, Clone)]
pub struct HoldersFetch {
    /// Which query produced the rows.
    pub method: FetchMethod,
    /// Snapshot date (`YYYY-MM-DD`) for the primary query.
    pub date: Option<String>,
    /// Rows, best holder first.
    pub rows: Vec<HolderRow>,
    /// The GraphQL endpoint queried.
    pub source_url: String,
}

/// The fallback query's acceptance threshold is capped at five rows
/// regardless of the configured primary minimum.
const FALLBACK_MIN_ROWS: usize = 5;

// ── Queries ─────────────────────────────────────────────────────

const TOKEN_HOLDERS_QUERY: &str = r#"
query ($date: String!, $address: String!, $limit: Int!) {
  EVM(dataset: archive, network: base) {
    TokenHolders(
      date: $date
      tokenSmartContract: $address
      limit: { count: $limit }
      orderBy: { descending: Balance_Amount }
      where: { Balance: { Amount: { gt: "0" } } }
    ) {
      Holder { Address }
      Balance { Amount }
    }
  }
}"#;

const BALANCE_UPDATES_QUERY: &str = r#"
query ($address: String!, $limit: Int!) {
  EVM(dataset: combined, network: base) {
    BalanceUpdates(
      limit: { count: $limit }
      orderBy: { descendingByField: "usd" }
      where: { Currency: { SmartContract: { is: $address } } }
    ) {
      BalanceUpdate { Address }
      amount: sum(of: BalanceUpdate_Amount, selectWhere: { gt: "0" })
      usd: sum(of: BalanceUpdate_AmountInUSD)
    }
  }
}"#;

/// Build the primary request body.
#[doc(hidden)]
pub fn build_token_holders_request(address: &str, date: &str, limit: usize) -> Value {
    serde_json::json!({
        "query": TOKEN_HOLDERS_QUERY,
        "variables": { "address": address, "date": date, "limit": limit }
    })
}

/// Build the fallback request body.
#[doc(hidden)]
pub fn build_balance_updates_request(address: &str, limit: usize) -> Value {
    serde_json::json!({
        "query": BALANCE_UPDATES_QUERY,
        "variables": { "address": address, "limit": limit }
    })
}

/// Extract the first GraphQL error message, if the body carries one.
#[doc(hidden)]
pub fn graphql_error(body: &Value) -> Option<String> {
    body.get("errors")?
        .as_array()?
        .first()?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

/// Parse primary-query rows.
#[doc(hidden)]
pub fn parse_token_holders(body: &Value) -> Vec<HolderRow> {
    let rows = body
        .pointer("/data/EVM/TokenHolders")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    rows.iter()
        .filter_map(|row| {
            let address = row.pointer("/Holder/Address")?.as_str()?.to_lowercase();
            let amount = row.pointer("/Balance/Amount")?.as_str()?.to_string();
            Some(HolderRow {
                address,
                amount,
                usd: None,
            })
        })
        .collect()
}

/// Parse fallback-query rows.
#[doc(hidden)]
pub fn parse_balance_updates(body: &Value) -> Vec<HolderRow> {
    let rows = body
        .pointer("/data/EVM/BalanceUpdates")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    rows.iter()
        .filter_map(|row| {
            let address = row
                .pointer("/BalanceUpdate/Address")?
                .as_str()?
                .to_lowercase();
            let amount = match row.get("amount") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return None,
            };
            let usd = match row.get("usd") {
                Some(Value::String(s)) => s.parse().ok(),
                Some(Value::Number(n)) => n.as_f64(),
                _ => None,
            };
            Some(HolderRow {
                address,
                amount,
                usd,
            })
        })
        .collect()
}

// ── Client ──────────────────────────────────────────────────────

/// Indexed-holder GraphQL client.
#[derive(Debug, Clone)]
pub struct HoldersClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HoldersClient {
    /// Create a client sharing the process-global HTTP client.
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }

    /// The GraphQL endpoint, used as `sourceUrl` on holder evidence.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn graphql(&self, request: Value) -> Result<Value, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(DEFAULT_TIMEOUT)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;
        let body = check_http_response(response).await?;
        let parsed: Value =
            serde_json::from_str(&body).map_err(|e| ProviderError::Parse(e.to_string()))?;
        if let Some(message) = graphql_error(&parsed) {
            return Err(ProviderError::Upstream(message));
        }
        Ok(parsed)
    }

    /// Fetch the top token holders.
    ///
    /// Walks `day_offsets` (capped at `probe_cap`) through the primary
    /// query, accepting the first date with at least `min(limit, min_rows)`
    /// rows; falls back to the USD-weighted query only when the ladder is
    /// exhausted without a quota error.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Upstream`] with
    /// `"Bitquery request failed with <status>"` on quota exhaustion, and
    /// an `Upstream("no holder data…")` error when neither query produced
    /// enough rows.
    pub async fn fetch_top_holders(
        &self,
        address: &str,
        limit: usize,
        day_offsets: &[i64],
        probe_cap: usize,
        min_rows: usize,
    ) -> Result<HoldersFetch, ProviderError> {
        let primary_threshold = limit.min(min_rows).max(1);

        for offset in day_offsets.iter().take(probe_cap) {
            let date = (Utc::now() - Duration::days(*offset))
                .format("%Y-%m-%d")
                .to_string();
            let request = build_token_holders_request(address, &date, limit);
            match self.graphql(request).await {
                Ok(body) => {
                    let rows = parse_token_holders(&body);
                    if rows.len() >= primary_threshold {
                        return Ok(HoldersFetch {
                            method: FetchMethod::TokenHolders,
                            date: Some(date),
                            rows,
                            source_url: self.endpoint.clone(),
                        });
                    }
                    tracing::debug!(date = %date, rows = rows.len(), "holder snapshot too thin, probing earlier date");
                }
                Err(e) if e.is_quota() => return Err(quota_error(e)),
                Err(e) => {
                    tracing::debug!(date = %date, error = %e, "holder snapshot probe failed");
                }
            }
        }

        let fallback_threshold = limit.min(FALLBACK_MIN_ROWS).max(1);
        let body = match self
            .graphql(build_balance_updates_request(address, limit))
            .await
        {
            Ok(body) => body,
            Err(e) if e.is_quota() => return Err(quota_error(e)),
            Err(e) => return Err(e),
        };
        let rows = parse_balance_updates(&body);
        if rows.len() >= fallback_threshold {
            return Ok(HoldersFetch {
                method: FetchMethod::BalanceUpdates,
                date: None,
                rows,
                source_url: self.endpoint.clone(),
            });
        }
        Err(ProviderError::Upstream(
            "no holder data available for this token".to_string(),
        ))
    }
}

/// Rewrite a quota error into the stable message stored on evidence.
fn quota_error(e: ProviderError) -> ProviderError {
    match e {
        ProviderError::HttpStatus { status, .. } => {
            ProviderError::Upstream(format!("Bitquery request failed with {status}"))
        }
        other => other,
    }
}
