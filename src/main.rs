#![allow(missing_docs)]

//! tokenhound — evidence-first token risk scanner for Base.
//!
//! Single binary: boots the store, the tool registry, the scan worker, and
//! the HTTP API, then serves until killed.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use tokenhound::bridge::LlmAnalyst;
use tokenhound::config::Config;
use tokenhound::providers::llm::LlmClient;
use tokenhound::providers::rpc::RpcClient;
use tokenhound::runner::ScanRunner;
use tokenhound::server::{self, AppState};
use tokenhound::store::Db;
use tokenhound::tools::ToolRegistry;
use tokenhound::worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("configuration error")?;

    let _logging_guard = tokenhound::logging::init(&config.logs_dir)?;
    info!(version = env!("CARGO_PKG_VERSION"), "tokenhound starting");

    let db = Arc::new(Db::open(&config.database_url).await?);

    // One HTTP client for every provider; per-call timeouts apply at
    // request time.
    let http = tokenhound::providers::build_http_client();
    let rpc = RpcClient::new(http.clone(), config.chain_rpc_url.clone());

    let registry = Arc::new(ToolRegistry::build(&config, http.clone(), rpc.clone()));
    info!(tools = ?registry.available(), "tool registry initialised");

    let llm = config
        .llm
        .as_ref()
        .map(|llm_config| LlmClient::new(http.clone(), llm_config.base_url.clone(), llm_config.api_key.clone()));
    let analyst = match (&llm, &config.llm) {
        (Some(client), Some(llm_config)) => {
            info!(model = %llm_config.model, "LLM planner/assessor enabled");
            Some(Arc::new(LlmAnalyst::new(client.clone(), llm_config))
                as Arc<dyn tokenhound::bridge::Analyst>)
        }
        _ => {
            info!("no LLM configured; scans use baseline plans and fallback assessments");
            None
        }
    };

    let runner = Arc::new(ScanRunner::new(Arc::clone(&db), Arc::clone(&registry), analyst));
    let worker = Worker::new(Arc::clone(&db), runner);

    // Drain anything left pending from a previous process.
    worker.trigger();

    let state = Arc::new(AppState {
        db,
        config: Arc::new(config.clone()),
        rpc,
        worker,
        llm,
    });
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
