//! Logging for the scan service.
//!
//! One subscriber, two sinks: a JSON file layer with daily rotation for
//! post-hoc scan forensics (runner and provider logs carry `scan_id`,
//! `tool`, and `job_id` fields, so a failed run can be reconstructed from
//! the file alone), and a human-readable stderr layer for watching a scan
//! live. The default filter keeps the pipeline at `info` while quieting
//! the HTTP and database internals underneath it; `RUST_LOG` overrides
//! everything.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Directives applied when `RUST_LOG` is unset: the scan pipeline at
/// `info`, transport and pool internals only when they misbehave. Provider
/// timeouts and degraded steps are logged by the runner itself, so nothing
/// of interest is lost by muting reqwest/sqlx chatter.
const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn,hyper=warn,reqwest=warn,tower_http=info";

/// Keeps the non-blocking file writer alive.
///
/// Held in `main` until after the HTTP server returns — by then the worker
/// has stopped appending scan events, and dropping the guard flushes
/// whatever the writer still buffers for the final runs.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Initialise the subscriber for the scan service.
///
/// JSON lines go to `{logs_dir}/tokenhound.log.YYYY-MM-DD` (daily
/// rotation), one file per day of scans; stderr gets the same stream in
/// compact human form with targets suppressed.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn init(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, "tokenhound.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    // The file keeps targets and structured fields for grepping by
    // scan_id; the console drops targets to keep step lines short.
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(false)
        .with_writer(non_blocking);

    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(LoggingGuard { _guard: guard })
}
