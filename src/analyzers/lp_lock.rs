//! LP lock inference for UniswapV2-style pairs.
//!
//! A pair whose LP tokens sit in a burn address cannot have its liquidity
//! pulled; a pair whose LP tokens sit with the deployer can. The probe is
//! `getReserves()` — only V2-style pairs answer it with the full
//! three-word blob — followed by `balanceOf` reads against the burn
//! addresses and the deployer, all divided over `totalSupply()` on big
//! integers.

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::providers::rpc::{
    encode_address_call, RpcClient, DEAD_ADDRESS, SELECTOR_BALANCE_OF, SELECTOR_GET_RESERVES,
    SELECTOR_TOTAL_SUPPLY, ZERO_ADDRESS,
};
use crate::providers::{rpc, ProviderError};
use crate::types::ConfidenceLevel;

use super::{format_pct_scaled, pct_scaled_to_f64, pct_threshold, ratio_pct_scaled};

/// A V2 `getReserves()` answer is three 32-byte words: `0x` + 192 hex
/// chars. Anything shorter is not a V2 pair.
const MIN_RESERVES_HEX_CHARS: usize = 194;

/// Burned-share threshold for a `locked` verdict.
const LOCKED_BURNED_PCT: u32 = 95;

/// Deployer-share threshold for an `unlocked` verdict.
const UNLOCKED_DEPLOYER_PCT: u32 = 20;

/// LP lock verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    /// Liquidity cannot be withdrawn by its original provider.
    Locked,
    /// The deployer still controls a large share of the LP tokens.
    Unlocked,
    /// Not enough signal either way.
    Unknown,
}

/// The analyzer's full output, stored verbatim in evidence data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LpLockAnalysis {
    /// Pair contract analyzed.
    pub pair_address: String,
    /// Pool style: `v2` when the reserves probe answered, `unknown`
    /// otherwise.
    pub pool_version: &'static str,
    /// Verdict.
    pub lock_status: LockStatus,
    /// Confidence in the verdict.
    pub confidence: ConfidenceLevel,
    /// Percent of LP supply in burn addresses, when measurable.
    pub burned_pct: Option<f64>,
    /// Percent of LP supply held by the deployer, when measurable.
    pub deployer_pct: Option<f64>,
    /// Human-readable explanation of the verdict.
    pub reason: String,
}

/// Classify a pair from its measured LP shares. Pure so the thresholds can
/// be tested without a chain.
pub fn classify(
    burned_scaled: &BigUint,
    deployer_scaled: Option<&BigUint>,
) -> (LockStatus, ConfidenceLevel, String) {
    if *burned_scaled >= pct_threshold(LOCKED_BURNED_PCT) {
        return (
            LockStatus::Locked,
            ConfidenceLevel::High,
            format!(
                "{}% of LP tokens are burned",
                format_pct_scaled(burned_scaled)
            ),
        );
    }
    if let Some(deployer) = deployer_scaled {
        if *deployer >= pct_threshold(UNLOCKED_DEPLOYER_PCT) {
            return (
                LockStatus::Unlocked,
                ConfidenceLevel::Medium,
                format!(
                    "{}% of LP tokens remain with the deployer",
                    format_pct_scaled(deployer)
                ),
            );
        }
    }
    let deployer_desc = deployer_scaled
        .map(|d| format!("{}%", format_pct_scaled(d)))
        .unwrap_or_else(|| "unknown".to_string());
    (
        LockStatus::Unknown,
        ConfidenceLevel::Low,
        format!(
            "LP distribution inconclusive: {}% burned, deployer share {}",
            format_pct_scaled(burned_scaled),
            deployer_desc
        ),
    )
}

/// Run the full LP lock analysis against a pair contract.
///
/// # Errors
///
/// Returns [`ProviderError`] when the chain node is unreachable or a
/// balance read fails after the pair was identified as V2-style. A pair
/// that merely is not V2 (revert or short return data) yields an `unknown`
/// analysis, not an error.
pub async fn analyze_lp_lock(
    rpc: &RpcClient,
    pair_address: &str,
    deployer_address: Option<&str>,
) -> Result<LpLockAnalysis, ProviderError> {
    let pair = pair_address.to_lowercase();

    // V2 probe. A node-level execution error means the function does not
    // exist there — that is a finding, not an outage.
    let reserves = match rpc.call(&pair, SELECTOR_GET_RESERVES).await {
        Ok(data) => data,
        Err(ProviderError::Rpc { .. }) => {
            return Ok(not_v2(pair));
        }
        Err(e) => return Err(e),
    };
    if reserves.len() < MIN_RESERVES_HEX_CHARS {
        return Ok(not_v2(pair));
    }

    let total_supply_hex = rpc.call(&pair, SELECTOR_TOTAL_SUPPLY).await?;
    let total_supply = rpc::decode_uint(&total_supply_hex).unwrap_or_default();
    if total_supply.is_zero() {
        return Ok(LpLockAnalysis {
            pair_address: pair,
            pool_version: "v2",
            lock_status: LockStatus::Unknown,
            confidence: ConfidenceLevel::Low,
            burned_pct: None,
            deployer_pct: None,
            reason: "pair reports zero LP total supply".to_string(),
        });
    }

    let balance_of = |holder: &str| encode_address_call(SELECTOR_BALANCE_OF, holder);
    let zero_call = balance_of(ZERO_ADDRESS);
    let dead_call = balance_of(DEAD_ADDRESS);
    let (zero_res, dead_res) = tokio::join!(rpc.call(&pair, &zero_call), rpc.call(&pair, &dead_call));
    let zero_balance = rpc::decode_uint(&zero_res?).unwrap_or_default();
    let dead_balance = rpc::decode_uint(&dead_res?).unwrap_or_default();
    let burned = zero_balance + dead_balance;

    let deployer_balance = match deployer_address {
        Some(deployer) => {
            let res = rpc.call(&pair, &balance_of(deployer)).await?;
            Some(rpc::decode_uint(&res).unwrap_or_default())
        }
        None => None,
    };

    let burned_scaled = ratio_pct_scaled(&burned, &total_supply).unwrap_or_default();
    let deployer_scaled =
        deployer_balance.and_then(|b| ratio_pct_scaled(&b, &total_supply));

    let (lock_status, confidence, reason) = classify(&burned_scaled, deployer_scaled.as_ref());

    Ok(LpLockAnalysis {
        pair_address: pair,
        pool_version: "v2",
        lock_status,
        confidence,
        burned_pct: Some(pct_scaled_to_f64(&burned_scaled)),
        deployer_pct: deployer_scaled.as_ref().map(pct_scaled_to_f64),
        reason,
    })
}

fn not_v2(pair_address: String) -> LpLockAnalysis {
    LpLockAnalysis {
        pair_address,
        pool_version: "unknown",
        lock_status: LockStatus::Unknown,
        confidence: ConfidenceLevel::Low,
        burned_pct: None,
        deployer_pct: None,
        reason: "pair contract does not expose UniswapV2-style reserves".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaled(pct_times_1e4: u64) -> BigUint {
        BigUint::from(pct_times_1e4)
    }

    #[test]
    fn test_classify_burned_locks() {
        let (status, confidence, reason) = classify(&scaled(97_0000), None);
        assert_eq!(status, LockStatus::Locked);
        assert_eq!(confidence, ConfidenceLevel::High);
        assert_eq!(reason, "97.0000% of LP tokens are burned");
    }

    #[test]
    fn test_classify_exactly_95_locks() {
        let (status, _, _) = classify(&scaled(95_0000), None);
        assert_eq!(status, LockStatus::Locked);
    }

    #[test]
    fn test_classify_deployer_share_unlocks() {
        let (status, confidence, reason) = classify(&scaled(10_0000), Some(&scaled(45_5000)));
        assert_eq!(status, LockStatus::Unlocked);
        assert_eq!(confidence, ConfidenceLevel::Medium);
        assert_eq!(reason, "45.5000% of LP tokens remain with the deployer");
    }

    #[test]
    fn test_classify_low_signal_is_unknown() {
        let (status, confidence, reason) = classify(&scaled(40_0000), Some(&scaled(5_0000)));
        assert_eq!(status, LockStatus::Unknown);
        assert_eq!(confidence, ConfidenceLevel::Low);
        assert!(reason.contains("40.0000% burned"));
        assert!(reason.contains("5.0000%"));
    }

    #[test]
    fn test_classify_no_deployer_is_unknown() {
        let (status, _, reason) = classify(&scaled(50_0000), None);
        assert_eq!(status, LockStatus::Unknown);
        assert!(reason.contains("deployer share unknown"));
    }

    #[test]
    fn test_burned_takes_priority_over_deployer() {
        // 96% burned and 30% with the deployer cannot both be true of the
        // same supply, but burned wins the classification order.
        let (status, _, _) = classify(&scaled(96_0000), Some(&scaled(30_0000)));
        assert_eq!(status, LockStatus::Locked);
    }

    #[test]
    fn test_analysis_serializes_camel_case() {
        let analysis = LpLockAnalysis {
            pair_address: "0xpair".to_string(),
            pool_version: "v2",
            lock_status: LockStatus::Locked,
            confidence: ConfidenceLevel::High,
            burned_pct: Some(97.0),
            deployer_pct: None,
            reason: "97.0000% of LP tokens are burned".to_string(),
        };
        let json = serde_json::to_value(&analysis).expect("serialize");
        assert_eq!(json["lockStatus"], "locked");
        assert_eq!(json["poolVersion"], "v2");
        assert_eq!(json["burnedPct"], 97.0);
    }
}
