//! Configuration loading from the process environment.
//!
//! All settings come from environment variables read once at boot
//! (`.env` files are honored via `dotenvy` in `main`). Two variables are
//! required; everything else is a conditional feature or a tunable with a
//! default. API keys never leave this struct except inside request headers.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// Network tag for every scan. The explorer and honeypot calls pin the
/// matching chain id.
pub const CHAIN: &str = "base";

/// Chain id for Base, sent to the explorer and honeypot APIs.
pub const CHAIN_ID: u64 = 8453;

// ── Top-level config ────────────────────────────────────────────

/// Process configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection string or file path (`DATABASE_URL`). Required.
    pub database_url: String,
    /// Chain JSON-RPC endpoint (`CHAIN_RPC_URL`). Required.
    pub chain_rpc_url: String,
    /// HTTP bind address (`BIND_ADDR`, default `127.0.0.1:8080`).
    pub bind_addr: String,
    /// Directory for rotated JSON logs (`LOGS_DIR`, default `./logs`).
    pub logs_dir: PathBuf,
    /// LLM planner/assessor; absent when `LLM_API_KEY` is not set.
    pub llm: Option<LlmConfig>,
    /// Block explorer; absent when `EXPLORER_API_KEY` is not set.
    pub explorer: Option<ExplorerConfig>,
    /// Indexed-holder GraphQL provider; absent when `HOLDERS_API_TOKEN` is
    /// not set.
    pub holders: Option<HoldersConfig>,
    /// Optional honeypot-simulator API key (`HONEYPOT_API_KEY`). The
    /// simulator works unauthenticated at a lower rate limit.
    pub honeypot_api_key: Option<String>,
    /// DEX aggregator base URL (`DEX_API_BASE`).
    pub dex_api_base: String,
    /// Completed-scan cache TTL in seconds (`SCAN_CACHE_TTL_SECS`, default 900).
    pub scan_cache_ttl_secs: u64,
    /// Holder-probe depth (`HOLDERS_MODE`, default `fast`).
    pub holders_mode: HoldersMode,
    /// Cap on archive-date probes per holders fetch (`HOLDERS_PROBE_CAP`).
    pub holders_probe_cap: usize,
    /// Minimum rows for a holders date probe to count (`HOLDERS_MIN_ROWS`,
    /// default 3).
    pub holders_min_rows: usize,
}

/// LLM provider settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Bearer API key.
    pub api_key: String,
    /// Primary model id.
    pub model: String,
    /// Fallback model id, tried when the primary produces no output.
    pub fallback_model: String,
    /// OpenAI-compatible API base URL.
    pub base_url: String,
}

/// Block-explorer settings (Etherscan-style v2 API).
#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    /// API key.
    pub api_key: String,
    /// API base URL.
    pub base_url: String,
}

/// Indexed-holder GraphQL provider settings.
#[derive(Debug, Clone)]
pub struct HoldersConfig {
    /// Bearer token.
    pub token: String,
    /// GraphQL endpoint.
    pub endpoint: String,
}

/// How many archive dates the holders provider probes before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldersMode {
    /// Probe days 1, 2, 7.
    Fast,
    /// Probe days 1, 2, 3, 7, 14, 30.
    Full,
    /// Never run the holders tool.
    Off,
}

impl HoldersMode {
    /// Past-day offsets probed in this mode, most recent first.
    pub fn day_offsets(self) -> &'static [i64] {
        match self {
            Self::Fast => &[1, 2, 7],
            Self::Full => &[1, 2, 3, 7, 14, 30],
            Self::Off => &[],
        }
    }
}

impl std::str::FromStr for HoldersMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "full" => Ok(Self::Full),
            "off" => Ok(Self::Off),
            other => Err(anyhow::anyhow!("unknown holders mode: {other}")),
        }
    }
}

// ── Defaults ────────────────────────────────────────────────────

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_LOGS_DIR: &str = "./logs";
const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b";
const DEFAULT_LLM_FALLBACK_MODEL: &str = "llama-3.1-8b";
const DEFAULT_LLM_BASE_URL: &str = "https://api.cerebras.ai/v1";
const DEFAULT_EXPLORER_BASE_URL: &str = "https://api.etherscan.io/v2/api";
const DEFAULT_HOLDERS_ENDPOINT: &str = "https://streaming.bitquery.io/eap";
const DEFAULT_DEX_API_BASE: &str = "https://api.dexscreener.com";
const DEFAULT_CACHE_TTL_SECS: u64 = 900;
const DEFAULT_HOLDERS_PROBE_CAP: usize = 6;
const DEFAULT_HOLDERS_MIN_ROWS: usize = 3;

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a tunable fails
    /// to parse.
    pub fn from_env() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using a custom resolver (for testing without touching the
    /// process environment).
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = match env("DATABASE_URL") {
            Some(v) if !v.trim().is_empty() => v,
            _ => bail!("DATABASE_URL is required"),
        };
        let chain_rpc_url = match env("CHAIN_RPC_URL") {
            Some(v) if !v.trim().is_empty() => v,
            _ => bail!("CHAIN_RPC_URL is required"),
        };

        let llm = env("LLM_API_KEY").map(|api_key| LlmConfig {
            api_key,
            model: env("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            fallback_model: env("LLM_FALLBACK_MODEL")
                .unwrap_or_else(|| DEFAULT_LLM_FALLBACK_MODEL.to_string()),
            base_url: env("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
        });

        let explorer = env("EXPLORER_API_KEY").map(|api_key| ExplorerConfig {
            api_key,
            base_url: env("EXPLORER_API_BASE")
                .unwrap_or_else(|| DEFAULT_EXPLORER_BASE_URL.to_string()),
        });

        let holders = env("HOLDERS_API_TOKEN").map(|token| HoldersConfig {
            token,
            endpoint: env("HOLDERS_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_HOLDERS_ENDPOINT.to_string()),
        });

        let scan_cache_ttl_secs = parse_or_default(
            env("SCAN_CACHE_TTL_SECS"),
            "SCAN_CACHE_TTL_SECS",
            DEFAULT_CACHE_TTL_SECS,
        )?;
        let holders_probe_cap = parse_or_default(
            env("HOLDERS_PROBE_CAP"),
            "HOLDERS_PROBE_CAP",
            DEFAULT_HOLDERS_PROBE_CAP,
        )?;
        let holders_min_rows = parse_or_default(
            env("HOLDERS_MIN_ROWS"),
            "HOLDERS_MIN_ROWS",
            DEFAULT_HOLDERS_MIN_ROWS,
        )?;

        let holders_mode = match env("HOLDERS_MODE") {
            Some(v) => v.parse().context("invalid HOLDERS_MODE")?,
            None => HoldersMode::Fast,
        };

        Ok(Self {
            database_url,
            chain_rpc_url,
            bind_addr: env("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            logs_dir: PathBuf::from(
                env("LOGS_DIR").unwrap_or_else(|| DEFAULT_LOGS_DIR.to_string()),
            ),
            llm,
            explorer,
            holders,
            honeypot_api_key: env("HONEYPOT_API_KEY"),
            dex_api_base: env("DEX_API_BASE").unwrap_or_else(|| DEFAULT_DEX_API_BASE.to_string()),
            scan_cache_ttl_secs,
            holders_mode,
            holders_probe_cap,
            holders_min_rows,
        })
    }

    /// Whether the explorer-backed tools can run.
    pub fn explorer_enabled(&self) -> bool {
        self.explorer.is_some()
    }

    /// Whether the holders tool can run.
    pub fn holders_enabled(&self) -> bool {
        self.holders.is_some() && self.holders_mode != HoldersMode::Off
    }

    /// Whether the LLM planner/assessor can run.
    pub fn llm_enabled(&self) -> bool {
        self.llm.is_some()
    }
}

fn parse_or_default<T: std::str::FromStr>(
    value: Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match value {
        Some(v) => v
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid value for {key}: {v:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_env(key: &str) -> Option<String> {
        match key {
            "DATABASE_URL" => Some("sqlite:scans.db".to_string()),
            "CHAIN_RPC_URL" => Some("https://mainnet.base.org".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_minimal_env_uses_defaults() {
        let config = Config::load_with(base_env).expect("load");
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.scan_cache_ttl_secs, 900);
        assert_eq!(config.holders_min_rows, 3);
        assert_eq!(config.holders_mode, HoldersMode::Fast);
        assert!(config.llm.is_none());
        assert!(!config.explorer_enabled());
        assert!(!config.holders_enabled());
    }

    #[test]
    fn test_missing_database_url_fails() {
        let result = Config::load_with(|key| match key {
            "CHAIN_RPC_URL" => Some("https://mainnet.base.org".to_string()),
            _ => None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_llm_key_enables_bridge_with_default_models() {
        let config = Config::load_with(|key| {
            if key == "LLM_API_KEY" {
                return Some("csk-test".to_string());
            }
            base_env(key)
        })
        .expect("load");
        let llm = config.llm.expect("llm config");
        assert_eq!(llm.model, "llama-3.3-70b");
        assert_eq!(llm.fallback_model, "llama-3.1-8b");
    }

    #[test]
    fn test_holders_mode_off_disables_tool() {
        let config = Config::load_with(|key| match key {
            "HOLDERS_API_TOKEN" => Some("bq-token".to_string()),
            "HOLDERS_MODE" => Some("off".to_string()),
            other => base_env(other),
        })
        .expect("load");
        assert!(config.holders.is_some());
        assert!(!config.holders_enabled());
    }

    #[test]
    fn test_invalid_tunable_is_rejected() {
        let result = Config::load_with(|key| match key {
            "SCAN_CACHE_TTL_SECS" => Some("soon".to_string()),
            other => base_env(other),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_holders_mode_day_offsets() {
        assert_eq!(HoldersMode::Fast.day_offsets(), &[1, 2, 7]);
        assert_eq!(HoldersMode::Full.day_offsets(), &[1, 2, 3, 7, 14, 30]);
        assert!(HoldersMode::Off.day_offsets().is_empty());
    }
}
