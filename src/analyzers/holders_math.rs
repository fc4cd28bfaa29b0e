//! Holder supply-percentage math.
//!
//! Inputs come in two shapes depending on which holders query produced the
//! rows: the snapshot query returns integer balance strings in token base
//! units, the fallback returns pre-divided decimal strings in token units.
//! Both are parsed into `BigUint` at one common decimal scale before any
//! ratio is taken, so the math is exact at any token magnitude.
//!
//! `pctOfSupply` is an absolute share of total supply and is only emitted
//! when the snapshot method, a parsable total supply, and known decimals
//! all line up. `relativeSharePct` is the share among the returned top-N
//! and is always emitted — consumers must treat it as relative.

use num_bigint::BigUint;
use num_traits::Zero;
use serde::Serialize;

use crate::providers::holders::{FetchMethod, HolderRow};

use super::{pct_scaled_to_f64, ratio_pct_scaled};

/// Common-scale ceiling. Amounts are aligned to at most this many
/// fractional digits to keep the numbers bounded.
const MAX_SCALE: u32 = 36;

/// Fractional digits actually meaningful to consumers.
const DISPLAY_DECIMALS: u32 = 18;

/// One holder with computed shares.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedHolder {
    /// Holder address, lowercased.
    pub address: String,
    /// Raw balance string as fetched.
    pub amount: String,
    /// Absolute share of total supply, percent. `None` when total supply
    /// or decimals are unknown or the fetch method cannot support it.
    pub pct_of_supply: Option<f64>,
    /// Share among the returned top-N, percent. Always present.
    pub relative_share_pct: f64,
}

/// Computed shares for the full top-N list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderBreakdown {
    /// Per-holder shares, in fetch order (largest first).
    pub holders: Vec<ComputedHolder>,
    /// Sum of the top five `pctOfSupply` values; `None` when any is `None`.
    pub top5_pct: Option<f64>,
    /// Sum of the top ten `pctOfSupply` values; `None` when any is `None`.
    pub top10_pct: Option<f64>,
}

/// Parse a decimal string (integer or fractional) into a `BigUint` scaled
/// to `scale` fractional digits. Extra fractional digits are truncated.
pub fn parse_decimal_scaled(s: &str, scale: u32) -> Option<BigUint> {
    let s = s.trim();
    if s.is_empty() || s.starts_with('-') {
        return None;
    }
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let scale_usize = usize::try_from(scale).ok()?;
    let mut digits = String::with_capacity(int_part.len().saturating_add(scale_usize));
    digits.push_str(if int_part.is_empty() { "0" } else { int_part });
    if frac_part.len() >= scale_usize {
        digits.push_str(frac_part.get(..scale_usize)?);
    } else {
        digits.push_str(frac_part);
        for _ in 0..scale_usize.saturating_sub(frac_part.len()) {
            digits.push('0');
        }
    }
    digits.parse().ok()
}

/// Rescale an integer base-unit amount with `decimals` fractional digits to
/// the common `scale`.
fn rescale_base_units(base_units: &BigUint, decimals: u32, scale: u32) -> BigUint {
    if scale >= decimals {
        base_units * BigUint::from(10u32).pow(scale.saturating_sub(decimals))
    } else {
        base_units / BigUint::from(10u32).pow(decimals.saturating_sub(scale))
    }
}

/// The common scale for a holder computation: enough digits to keep the
/// token's precision, capped to prevent blow-up.
fn common_scale(decimals: Option<u32>) -> u32 {
    decimals.unwrap_or(0).max(DISPLAY_DECIMALS).min(MAX_SCALE)
}

/// Compute per-holder supply shares.
///
/// `total_supply_base` is the `totalSupply()` read, a decimal string in
/// base units. `rows` are in fetch order (largest first).
pub fn compute_holder_shares(
    rows: &[HolderRow],
    method: FetchMethod,
    total_supply_base: Option<&str>,
    decimals: Option<u32>,
) -> HolderBreakdown {
    let scale = common_scale(decimals);

    // Each holder amount at the common scale, per the fetch method's
    // amount encoding.
    let scaled_amounts: Vec<Option<BigUint>> = rows
        .iter()
        .map(|row| match method {
            FetchMethod::TokenHolders => {
                let base: BigUint = row.amount.trim().parse().ok()?;
                Some(rescale_base_units(&base, decimals?, scale))
            }
            FetchMethod::BalanceUpdates => parse_decimal_scaled(&row.amount, scale),
        })
        .collect();

    let supply_scaled: Option<BigUint> = match (method, total_supply_base, decimals) {
        (FetchMethod::TokenHolders, Some(supply), Some(d)) => supply
            .trim()
            .parse::<BigUint>()
            .ok()
            .map(|s| rescale_base_units(&s, d, scale))
            .filter(|s| !s.is_zero()),
        _ => None,
    };

    let total_of_returned: BigUint = scaled_amounts
        .iter()
        .flatten()
        .fold(BigUint::zero(), |acc, a| acc + a);

    let holders: Vec<ComputedHolder> = rows
        .iter()
        .zip(&scaled_amounts)
        .map(|(row, scaled)| {
            let pct_of_supply = match (scaled, &supply_scaled) {
                (Some(amount), Some(supply)) => {
                    ratio_pct_scaled(amount, supply).map(|p| pct_scaled_to_f64(&p))
                }
                _ => None,
            };
            let relative_share_pct = scaled
                .as_ref()
                .and_then(|amount| ratio_pct_scaled(amount, &total_of_returned))
                .map(|p| pct_scaled_to_f64(&p))
                .unwrap_or(0.0);
            ComputedHolder {
                address: row.address.clone(),
                amount: row.amount.clone(),
                pct_of_supply,
                relative_share_pct,
            }
        })
        .collect();

    HolderBreakdown {
        top5_pct: sum_pct(&holders, 5),
        top10_pct: sum_pct(&holders, 10),
        holders,
    }
}

/// Sum `pctOfSupply` over the first `n` holders; `None` if any of them is
/// `None`.
fn sum_pct(holders: &[ComputedHolder], n: usize) -> Option<f64> {
    let slice = holders.get(..n.min(holders.len()))?;
    if slice.is_empty() {
        return None;
    }
    slice
        .iter()
        .map(|h| h.pct_of_supply)
        .sum::<Option<f64>>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(address: &str, amount: &str) -> HolderRow {
        HolderRow {
            address: address.to_string(),
            amount: amount.to_string(),
            usd: None,
        }
    }

    #[test]
    fn test_parse_decimal_scaled_integer() {
        let v = parse_decimal_scaled("123", 4).expect("parse");
        assert_eq!(v, BigUint::from(1230000u32));
    }

    #[test]
    fn test_parse_decimal_scaled_fraction() {
        let v = parse_decimal_scaled("1.5", 4).expect("parse");
        assert_eq!(v, BigUint::from(15000u32));
    }

    #[test]
    fn test_parse_decimal_scaled_truncates_extra_digits() {
        let v = parse_decimal_scaled("0.123456", 4).expect("parse");
        assert_eq!(v, BigUint::from(1234u32));
    }

    #[test]
    fn test_parse_decimal_scaled_rejects_garbage() {
        assert!(parse_decimal_scaled("", 4).is_none());
        assert!(parse_decimal_scaled("-5", 4).is_none());
        assert!(parse_decimal_scaled("1e9", 4).is_none());
        assert!(parse_decimal_scaled("abc", 4).is_none());
    }

    #[test]
    fn test_snapshot_shares_with_known_supply() {
        // 18-decimals token, supply 1000 tokens; holders own 400 and 100.
        let supply = "1000000000000000000000";
        let rows = vec![
            row("0xaaa", "400000000000000000000"),
            row("0xbbb", "100000000000000000000"),
        ];
        let breakdown =
            compute_holder_shares(&rows, FetchMethod::TokenHolders, Some(supply), Some(18));

        let pct0 = breakdown.holders[0].pct_of_supply.expect("pct");
        let pct1 = breakdown.holders[1].pct_of_supply.expect("pct");
        assert!((pct0 - 40.0).abs() < 1e-9);
        assert!((pct1 - 10.0).abs() < 1e-9);

        // Relative shares sum to 100 among returned rows.
        assert!((breakdown.holders[0].relative_share_pct - 80.0).abs() < 1e-9);
        assert!((breakdown.holders[1].relative_share_pct - 20.0).abs() < 1e-9);

        let top5 = breakdown.top5_pct.expect("top5");
        assert!((top5 - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_method_never_emits_absolute_pct() {
        let rows = vec![row("0xaaa", "1234.5"), row("0xbbb", "100")];
        let breakdown = compute_holder_shares(
            &rows,
            FetchMethod::BalanceUpdates,
            Some("1000000000000000000000"),
            Some(18),
        );
        assert!(breakdown.holders[0].pct_of_supply.is_none());
        assert!(breakdown.top5_pct.is_none());
        assert!(breakdown.top10_pct.is_none());
        // Relative shares still computed.
        assert!(breakdown.holders[0].relative_share_pct > 90.0);
    }

    #[test]
    fn test_unknown_decimals_disables_absolute_pct() {
        let rows = vec![row("0xaaa", "400")];
        let breakdown =
            compute_holder_shares(&rows, FetchMethod::TokenHolders, Some("1000"), None);
        assert!(breakdown.holders[0].pct_of_supply.is_none());
    }

    #[test]
    fn test_unparsable_supply_disables_absolute_pct() {
        let rows = vec![row("0xaaa", "400")];
        let breakdown =
            compute_holder_shares(&rows, FetchMethod::TokenHolders, Some("n/a"), Some(18));
        assert!(breakdown.holders[0].pct_of_supply.is_none());
        assert!(breakdown.top10_pct.is_none());
    }

    #[test]
    fn test_huge_amounts_do_not_overflow() {
        // Amounts at the 10^36 scale.
        let supply = format!("4{}", "0".repeat(36));
        let rows = vec![row("0xaaa", &format!("1{}", "0".repeat(36)))];
        let breakdown = compute_holder_shares(
            &rows,
            FetchMethod::TokenHolders,
            Some(&supply),
            Some(18),
        );
        let pct = breakdown.holders[0].pct_of_supply.expect("pct");
        assert!((pct - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_supply_disables_absolute_pct() {
        let rows = vec![row("0xaaa", "400")];
        let breakdown =
            compute_holder_shares(&rows, FetchMethod::TokenHolders, Some("0"), Some(18));
        assert!(breakdown.holders[0].pct_of_supply.is_none());
    }
}
