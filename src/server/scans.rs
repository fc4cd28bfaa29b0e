//! Scan lifecycle handlers: preflight, create, get, run, events, chat.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::bridge::chat::{answer_about_scan, ChatMessage};
use crate::config::CHAIN;
use crate::evidence::EvidenceLedger;
use crate::runner::SCORE_VERSION;
use crate::types::Scan;

use super::error::ApiError;
use super::{normalize_address, AppState};

/// Query for the preflight endpoint.
#[derive(Debug, Deserialize)]
pub struct PreflightQuery {
    /// Token address to probe.
    pub address: String,
}

/// Body for create-scan.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScanRequest {
    /// Token address to scan.
    pub token_address: String,
}

/// Query for the events endpoint.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Return events with a global id strictly greater than this.
    #[serde(default)]
    pub after: i64,
}

/// Body for the chat endpoint.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Conversation so far, oldest first.
    pub messages: Vec<ChatMessage>,
}

fn parse_scan_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid scan id: {raw}")))
}

async fn load_scan(state: &AppState, id: Uuid) -> Result<Scan, ApiError> {
    state
        .db
        .get_scan(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("scan not found: {id}")))
}

// ── GET /api/preflight/contract-code ────────────────────────────

/// Cheap has-bytecode probe used by the UI before creating a scan.
pub async fn preflight(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PreflightQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let address = normalize_address(&query.address)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid token address: {}", query.address)))?;

    let code = state
        .rpc
        .get_code(&address)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    let bare = code.strip_prefix("0x").unwrap_or(&code);

    Ok(Json(serde_json::json!({
        "chain": CHAIN,
        "address": address,
        "hasCode": !bare.is_empty(),
        "bytecodeSizeBytes": bare.len() / 2,
    })))
}

// ── POST /api/scans ─────────────────────────────────────────────

/// Create a scan (or return a fresh cached one).
pub async fn create_scan(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateScanRequest>,
) -> Result<Response, ApiError> {
    let address = normalize_address(&body.token_address).ok_or_else(|| {
        ApiError::BadRequest(format!("invalid token address: {}", body.token_address))
    })?;

    // Preflight: refuse to scan addresses with no bytecode.
    let code = state
        .rpc
        .get_code(&address)
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    if code.strip_prefix("0x").unwrap_or(&code).is_empty() {
        return Err(ApiError::BadRequest(
            "address does not contain contract bytecode on Base".to_string(),
        ));
    }

    // Cache path: a recent complete scan answers instead of a new run.
    if let Some(cached) = state.db.latest_complete_scan(CHAIN, &address).await? {
        let age_secs = Utc::now()
            .signed_duration_since(cached.created_at)
            .num_seconds();
        let ttl = i64::try_from(state.config.scan_cache_ttl_secs).unwrap_or(i64::MAX);
        if age_secs >= 0 && age_secs <= ttl {
            return Ok((
                StatusCode::OK,
                Json(serde_json::json!({
                    "scanId": cached.id,
                    "status": "complete",
                    "cached": true,
                })),
            )
                .into_response());
        }
    }

    let scan = state
        .db
        .insert_queued_scan(
            Uuid::new_v4(),
            CHAIN,
            &address,
            env!("CARGO_PKG_VERSION"),
            SCORE_VERSION,
        )
        .await?;
    state.db.enqueue_job(scan.id).await?;
    state.worker.trigger();

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "scanId": scan.id,
            "status": "queued",
            "cached": false,
        })),
    )
        .into_response())
}

// ── GET /api/scans/:id ──────────────────────────────────────────

/// Full scan record.
pub async fn get_scan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Scan>, ApiError> {
    let scan_id = parse_scan_id(&id)?;
    Ok(Json(load_scan(&state, scan_id).await?))
}

// ── POST /api/scans/:id/run ─────────────────────────────────────

/// Enqueue a run for an existing scan (idempotent).
pub async fn run_scan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let scan_id = parse_scan_id(&id)?;
    let scan = load_scan(&state, scan_id).await?;

    if scan.status.is_terminal() {
        return Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "scanId": scan.id,
                "status": scan.status,
                "skipped": true,
            })),
        )
            .into_response());
    }

    let outcome = state.db.enqueue_job(scan_id).await?;
    state.worker.trigger();

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "scanId": scan.id,
            "status": scan.status,
            "enqueued": outcome.enqueued,
            "jobId": outcome.job.id,
            "jobStatus": outcome.job.status,
        })),
    )
        .into_response())
}

// ── GET /api/scans/:id/events ───────────────────────────────────

/// Poll-style event page, for clients that do not hold an SSE stream.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let scan_id = parse_scan_id(&id)?;
    let scan = load_scan(&state, scan_id).await?;

    let events = state.db.list_events_after(scan_id, query.after).await?;
    let next_after = events.last().map(|e| e.id).unwrap_or(query.after);

    Ok(Json(serde_json::json!({
        "scanId": scan.id,
        "status": scan.status,
        "events": events,
        "nextAfter": next_after,
    })))
}

// ── POST /api/scans/:id/chat ────────────────────────────────────

/// Evidence-grounded chat about a scan.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let scan_id = parse_scan_id(&id)?;

    if body.messages.is_empty() {
        return Err(ApiError::BadRequest("messages must not be empty".to_string()));
    }
    for message in &body.messages {
        if message.content.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "messages must not have empty content".to_string(),
            ));
        }
        if message.role != "user" && message.role != "assistant" {
            return Err(ApiError::BadRequest(format!(
                "unsupported message role: {}",
                message.role
            )));
        }
    }

    let scan = load_scan(&state, scan_id).await?;
    let (Some(llm), Some(llm_config)) = (&state.llm, &state.config.llm) else {
        return Err(ApiError::Unavailable(
            "chat requires an LLM to be configured".to_string(),
        ));
    };

    let ledger: EvidenceLedger = scan
        .evidence
        .clone()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    let message = answer_about_scan(
        llm,
        &llm_config.model,
        &scan.token_address,
        &ledger,
        &body.messages,
    )
    .await
    .map_err(|e| ApiError::Unavailable(e.to_string()))?;

    Ok(Json(serde_json::json!({ "message": message })))
}
