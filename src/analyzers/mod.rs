//! Derived analyses over raw tool responses.
//!
//! Everything that touches token amounts runs on [`num_bigint::BigUint`]
//! with an explicit decimal scale; binary floating point is only used at
//! the very edge, to render an already-bounded percentage into JSON.

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

pub mod abi;
pub mod holders_math;
pub mod lp_lock;

/// Fractional digits carried by scaled percentages.
pub const PCT_FRACTION_DIGITS: u32 = 4;

/// Compute `num / den` as a percentage scaled by `10^4`
/// (`97.2150%` → `972150`). Returns `None` for a zero denominator.
pub fn ratio_pct_scaled(num: &BigUint, den: &BigUint) -> Option<BigUint> {
    if den.is_zero() {
        return None;
    }
    let hundred = BigUint::from(100u32);
    let scale = BigUint::from(10u32).pow(PCT_FRACTION_DIGITS);
    Some(num * hundred * scale / den)
}

/// Scaled-percentage value for an integer percent threshold
/// (`95` → `950000`).
pub fn pct_threshold(percent: u32) -> BigUint {
    BigUint::from(percent) * BigUint::from(10u32).pow(PCT_FRACTION_DIGITS)
}

/// Render a scaled percentage as an `f64` for JSON payloads.
///
/// Percentages are bounded (a holder cannot own more than 100% of supply a
/// few times over), so the conversion is exact for every realistic value.
pub fn pct_scaled_to_f64(scaled: &BigUint) -> f64 {
    let divisor = 10f64.powi(i32::try_from(PCT_FRACTION_DIGITS).unwrap_or(4));
    scaled.to_f64().unwrap_or(f64::MAX) / divisor
}

/// Render a scaled percentage with fixed 4-digit precision, e.g.
/// `"97.2150"`.
pub fn format_pct_scaled(scaled: &BigUint) -> String {
    let scale = BigUint::from(10u32).pow(PCT_FRACTION_DIGITS);
    let whole = scaled / &scale;
    let frac = scaled % &scale;
    format!("{whole}.{frac:0>4}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_pct_scaled() {
        let num = BigUint::from(97u32);
        let den = BigUint::from(100u32);
        let scaled = ratio_pct_scaled(&num, &den).expect("ratio");
        assert_eq!(scaled, BigUint::from(970000u32));
        assert_eq!(format_pct_scaled(&scaled), "97.0000");
    }

    #[test]
    fn test_ratio_pct_scaled_zero_denominator() {
        assert!(ratio_pct_scaled(&BigUint::from(1u32), &BigUint::zero()).is_none());
    }

    #[test]
    fn test_ratio_pct_survives_huge_values() {
        // 10^36-scale amounts must not overflow.
        let num = BigUint::from(10u32).pow(36);
        let den = BigUint::from(10u32).pow(36) * BigUint::from(2u32);
        let scaled = ratio_pct_scaled(&num, &den).expect("ratio");
        assert_eq!(format_pct_scaled(&scaled), "50.0000");
    }

    #[test]
    fn test_pct_threshold_matches_scale() {
        let num = BigUint::from(95u32);
        let den = BigUint::from(100u32);
        let scaled = ratio_pct_scaled(&num, &den).expect("ratio");
        assert_eq!(scaled, pct_threshold(95));
    }

    #[test]
    fn test_format_pads_fraction() {
        let scaled = BigUint::from(1205u32); // 0.1205%
        assert_eq!(format_pct_scaled(&scaled), "0.1205");
        let scaled = BigUint::from(10005u32); // 1.0005%
        assert_eq!(format_pct_scaled(&scaled), "1.0005");
    }
}
