//! External data-provider clients.
//!
//! One module per upstream: chain JSON-RPC, block explorer, DEX aggregator,
//! honeypot simulator, indexed-holder GraphQL, and the LLM. All clients
//! share a process-global [`reqwest::Client`], carry per-call timeouts, and
//! report failures as structured [`ProviderError`]s — tool executors turn
//! those into unavailable evidence items; nothing here panics or caches.

use std::time::Duration;

use regex::Regex;

pub mod dexscreener;
pub mod explorer;
pub mod holders;
pub mod honeypot;
pub mod llm;
pub mod rpc;

/// Default timeout for provider calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The honeypot simulation runs a transaction simulation upstream and is
/// allowed a little longer.
pub const HONEYPOT_TIMEOUT: Duration = Duration::from_secs(12);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by data providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure (includes per-call timeout).
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match the expected schema.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// Upstream responded with a non-success status.
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// JSON-RPC error object from the chain node.
    #[error("Chain RPC error ({code}): {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },
    /// Envelope-level error from an otherwise-successful response.
    #[error("{0}")]
    Upstream(String),
}

impl ProviderError {
    /// Whether this error means the upstream quota or rate limit was hit.
    ///
    /// Used by the holders client to short-circuit instead of burning the
    /// remaining quota on a fallback query.
    pub fn is_quota(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => *status == 402 || *status == 429,
            Self::Upstream(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("quota")
                    || lower.contains("rate limit")
                    || lower.contains("payment required")
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Read a provider response to completion, treating any non-2xx status as
/// a structured failure.
///
/// The body is consumed either way: success bodies feed the caller's
/// parser, failure bodies are sanitized and become the `error` string on
/// an unavailable evidence item.
///
/// # Errors
///
/// `ProviderError::Request` when the transfer itself fails,
/// `ProviderError::HttpStatus` with the sanitized body otherwise.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(body);
    }
    Err(ProviderError::HttpStatus {
        status: status.as_u16(),
        body: sanitize_http_error_body(&body),
    })
}

/// Collapse whitespace, redact anything that looks like a credential, and
/// truncate. Error bodies end up in evidence items and logs, so they must
/// never leak an API key echoed back by an upstream.
pub fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"sk-[A-Za-z0-9_\-]{16,}",
        r"csk-[A-Za-z0-9_\-]{16,}",
        r"Bearer\s+[A-Za-z0-9_\-\.]{16,}",
        r"apikey=[A-Za-z0-9]{16,}",
        r"ory_at_[A-Za-z0-9_\-]{16,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

/// Build the process-global HTTP client shared by all providers.
///
/// Per-call timeouts are applied at request time; the client itself only
/// carries the connect timeout.
pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .user_agent(concat!("tokenhound/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}
