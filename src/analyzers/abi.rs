//! ABI-driven capability inference.
//!
//! The explorer hands back the verified ABI as a JSON string; the scanner
//! only cares about function *names*. Substring matching on lowercased
//! names is deliberately loose — `setMaxTaxAmount`, `updateBuyTax`, and
//! `setFees` should all trip the fee flag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::providers::rpc::{DEAD_ADDRESS, ZERO_ADDRESS};

/// Boolean capability flags inferred from ABI function names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityFlags {
    /// Some function name contains `mint`.
    pub mint_possible: bool,
    /// `blacklist` or `blocklist`.
    pub can_blacklist: bool,
    /// `pause` or `unpause`.
    pub can_pause: bool,
    /// `setfee`, `tax`, `settax`, `setbuy`, or `setsell`.
    pub can_set_fees: bool,
    /// `trading`, `enabletrading`, or `disabletrading`.
    pub has_trading_toggle: bool,
    /// The explorer flags the contract as a proxy, so the implementation
    /// (and with it every flag above) can change.
    pub upgradeable_proxy: bool,
}

/// Lowercased function names from an ABI JSON string.
///
/// # Errors
///
/// Returns the underlying error when the ABI string is not valid JSON.
pub fn function_names(abi_json: &str) -> Result<Vec<String>, serde_json::Error> {
    let abi: Value = serde_json::from_str(abi_json)?;
    let entries = abi.as_array().cloned().unwrap_or_default();
    Ok(entries
        .iter()
        .filter(|e| e.get("type").and_then(|t| t.as_str()) == Some("function"))
        .filter_map(|e| e.get("name").and_then(|n| n.as_str()))
        .map(str::to_lowercase)
        .collect())
}

/// Whether the ABI exposes a zero-argument function called `name`.
pub fn abi_has_function(abi_json: &str, name: &str) -> bool {
    function_names(abi_json)
        .map(|names| names.iter().any(|n| n == name))
        .unwrap_or(false)
}

/// Scan ABI function names for risk-relevant capabilities.
///
/// # Errors
///
/// Returns the underlying error when the ABI string is not valid JSON.
pub fn scan_capabilities(
    abi_json: &str,
    is_proxy: bool,
) -> Result<CapabilityFlags, serde_json::Error> {
    let names = function_names(abi_json)?;
    let any = |needles: &[&str]| names.iter().any(|n| needles.iter().any(|k| n.contains(k)));

    Ok(CapabilityFlags {
        mint_possible: any(&["mint"]),
        can_blacklist: any(&["blacklist", "blocklist"]),
        can_pause: any(&["pause", "unpause"]),
        can_set_fees: any(&["setfee", "tax", "settax", "setbuy", "setsell"]),
        has_trading_toggle: any(&["trading", "enabletrading", "disabletrading"]),
        upgradeable_proxy: is_proxy,
    })
}

/// Whether an owner address counts as renounced: the zero address or the
/// `0x…dead` sentinel.
pub fn is_renounced_owner(address: &str) -> bool {
    let lower = address.to_lowercase();
    lower == ZERO_ADDRESS || lower == DEAD_ADDRESS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abi_with(names: &[&str]) -> String {
        let entries: Vec<Value> = names
            .iter()
            .map(|n| serde_json::json!({"type": "function", "name": n}))
            .collect();
        serde_json::to_string(&entries).expect("abi json")
    }

    #[test]
    fn test_scan_flags_mint_and_pause() {
        let abi = abi_with(&["mint", "transfer", "pause", "unpause"]);
        let flags = scan_capabilities(&abi, false).expect("scan");
        assert!(flags.mint_possible);
        assert!(flags.can_pause);
        assert!(!flags.can_blacklist);
        assert!(!flags.can_set_fees);
        assert!(!flags.has_trading_toggle);
        assert!(!flags.upgradeable_proxy);
    }

    #[test]
    fn test_scan_matches_substrings_case_insensitively() {
        let abi = abi_with(&["updateBuyTax", "setMaxSellAmount", "enableTrading"]);
        let flags = scan_capabilities(&abi, false).expect("scan");
        assert!(flags.can_set_fees);
        assert!(flags.has_trading_toggle);
        assert!(!flags.mint_possible);
    }

    #[test]
    fn test_scan_blocklist_variant() {
        let abi = abi_with(&["addToBlocklist"]);
        let flags = scan_capabilities(&abi, false).expect("scan");
        assert!(flags.can_blacklist);
    }

    #[test]
    fn test_proxy_flag_passes_through() {
        let abi = abi_with(&["transfer"]);
        let flags = scan_capabilities(&abi, true).expect("scan");
        assert!(flags.upgradeable_proxy);
    }

    #[test]
    fn test_scan_ignores_events_and_errors() {
        let abi = r#"[
            {"type": "event", "name": "MintFinished"},
            {"type": "function", "name": "transfer"}
        ]"#;
        let flags = scan_capabilities(abi, false).expect("scan");
        assert!(!flags.mint_possible);
    }

    #[test]
    fn test_abi_has_function() {
        let abi = abi_with(&["owner", "transfer"]);
        assert!(abi_has_function(&abi, "owner"));
        assert!(!abi_has_function(&abi, "renounceownership"));
        assert!(!abi_has_function("not json", "owner"));
    }

    #[test]
    fn test_invalid_abi_is_an_error() {
        assert!(scan_capabilities("Contract source code not verified", false).is_err());
    }

    #[test]
    fn test_is_renounced_owner() {
        assert!(is_renounced_owner(
            "0x0000000000000000000000000000000000000000"
        ));
        assert!(is_renounced_owner(
            "0x000000000000000000000000000000000000dEaD"
        ));
        assert!(!is_renounced_owner(
            "0xab5801a7d398351b8be11c439e05c5b3259aec9b"
        ));
    }

    #[test]
    fn test_serializes_camel_case() {
        let abi = abi_with(&["mint"]);
        let flags = scan_capabilities(&abi, true).expect("scan");
        let json = serde_json::to_value(flags).expect("serialize");
        assert_eq!(json["mintPossible"], true);
        assert_eq!(json["upgradeableProxy"], true);
        assert_eq!(json["canSetFees"], false);
    }
}
