//! HTTP surface: scan lifecycle API and the event-stream fan-out.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::providers::llm::LlmClient;
use crate::providers::rpc::RpcClient;
use crate::store::Db;
use crate::worker::Worker;

pub mod error;
pub mod scans;
pub mod stream;

/// Shared state behind every handler.
pub struct AppState {
    /// Scan database.
    pub db: Arc<Db>,
    /// Process configuration.
    pub config: Arc<Config>,
    /// Chain RPC client for the preflight path.
    pub rpc: RpcClient,
    /// The scan worker; handlers trigger it after enqueueing.
    pub worker: Arc<Worker>,
    /// LLM client for the chat endpoint, when configured.
    pub llm: Option<LlmClient>,
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/preflight/contract-code", get(scans::preflight))
        .route("/api/scans", post(scans::create_scan))
        .route("/api/scans/:id", get(scans::get_scan))
        .route("/api/scans/:id/run", post(scans::run_scan))
        .route("/api/scans/:id/events", get(scans::list_events))
        .route("/api/scans/:id/stream", get(stream::stream_events))
        .route("/api/scans/:id/chat", post(scans::chat))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Validate and lowercase a token address: `0x` + 40 hex chars.
pub fn normalize_address(raw: &str) -> Option<String> {
    let lower = raw.trim().to_lowercase();
    let bare = lower.strip_prefix("0x")?;
    if bare.len() != 40 || !bare.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address_lowercases() {
        let addr = normalize_address("0xF43eB8de897FBc7F2502483B2bEF7bb9EA179229").expect("valid");
        assert_eq!(addr, "0xf43eb8de897fbc7f2502483b2bef7bb9ea179229");
    }

    #[test]
    fn test_normalize_address_rejects_bad_input() {
        assert!(normalize_address("f43eb8de897fbc7f2502483b2bef7bb9ea179229").is_none());
        assert!(normalize_address("0x1234").is_none());
        assert!(normalize_address("0xZZZeb8de897fbc7f2502483b2bef7bb9ea179229").is_none());
        assert!(normalize_address("").is_none());
    }

    #[test]
    fn test_normalize_address_trims_whitespace() {
        let addr =
            normalize_address("  0xf43eb8de897fbc7f2502483b2bef7bb9ea179229\n").expect("valid");
        assert!(addr.starts_with("0x"));
        assert_eq!(addr.len(), 42);
    }
}
