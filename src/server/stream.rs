//! SSE fan-out: replay a scan's persisted timeline, then tail new events.
//!
//! Each subscriber gets its own poll loop over the event log with a
//! resumable cursor (`?after=` or `Last-Event-ID`, whichever is larger).
//! The loop closes with an `end` frame once a terminal event or a
//! terminal scan status is observed; client disconnects cancel only this
//! subscriber's loop, never the backing run.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use uuid::Uuid;

use crate::store::Db;
use crate::types::ScanEvent;

use super::error::ApiError;
use super::AppState;

/// Reconnect hint sent in the opening frames.
const RETRY_HINT: Duration = Duration::from_millis(3000);
/// Pause between poll iterations.
const POLL_INTERVAL: Duration = Duration::from_millis(1200);
/// Idle iterations between scan-status checks (~every 5s).
const STATUS_CHECK_EVERY: u32 = 4;
/// Comment heartbeat interval without traffic.
const HEARTBEAT: Duration = Duration::from_secs(15);
/// Buffered frames per subscriber.
const CHANNEL_CAPACITY: usize = 64;

/// Query for the stream endpoint.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Resume after this global event id.
    #[serde(default)]
    pub after: i64,
}

/// Resolve the resume cursor: the larger of the query parameter and the
/// `Last-Event-ID` header.
fn resolve_cursor(query_after: i64, headers: &HeaderMap) -> i64 {
    let header_after = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0);
    query_after.max(header_after)
}

fn event_frame(event: &ScanEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default()
        .id(event.id.to_string())
        .event(event.event_type.clone())
        .data(data)
}

fn end_frame(cursor: i64) -> Event {
    Event::default()
        .event("end")
        .data(format!("{{\"cursor\":{cursor}}}"))
}

fn is_terminal_event(event: &ScanEvent) -> bool {
    event.event_type == "run.completed" || event.event_type == "run.failed"
}

/// GET `/api/scans/:id/stream`
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Sse<ReceiverStream<Result<Event, Infallible>>>, ApiError> {
    let scan_id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::BadRequest(format!("invalid scan id: {id}")))?;
    if state.db.get_scan(scan_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("scan not found: {scan_id}")));
    }

    let cursor = resolve_cursor(query.after, &headers);
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(CHANNEL_CAPACITY);
    let db = Arc::clone(&state.db);
    tokio::spawn(tail_loop(db, scan_id, cursor, tx));

    Ok(Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::new().interval(HEARTBEAT).text("hb")))
}

/// The per-subscriber poll loop. Exits when the client hangs up (send
/// fails / channel closed) or the scan reaches a terminal state.
async fn tail_loop(
    db: Arc<Db>,
    scan_id: Uuid,
    mut cursor: i64,
    tx: mpsc::Sender<Result<Event, Infallible>>,
) {
    // Opening frames: reconnect hint, then `ready` with the cursor.
    let ready = Event::default()
        .retry(RETRY_HINT)
        .event("ready")
        .data(format!("{{\"cursor\":{cursor}}}"));
    if tx.send(Ok(ready)).await.is_err() {
        return;
    }

    let mut idle_iterations: u32 = 0;
    loop {
        let events = match db.list_events_after(scan_id, cursor).await {
            Ok(events) => events,
            Err(e) => {
                debug!(scan_id = %scan_id, error = %e, "stream poll failed, closing");
                return;
            }
        };

        if events.is_empty() {
            idle_iterations = idle_iterations.saturating_add(1);
            // Periodic status check: catch scans that went terminal
            // without us seeing the closing event (e.g. resumed past it).
            if idle_iterations % STATUS_CHECK_EVERY == 0 {
                match db.get_scan(scan_id).await {
                    Ok(Some(scan)) if scan.status.is_terminal() => {
                        // One trailing read so nothing between the last
                        // poll and the terminal write is lost.
                        if let Ok(trailing) = db.list_events_after(scan_id, cursor).await {
                            for event in &trailing {
                                cursor = event.id;
                                if tx.send(Ok(event_frame(event))).await.is_err() {
                                    return;
                                }
                            }
                        }
                        let _ = tx.send(Ok(end_frame(cursor))).await;
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(scan_id = %scan_id, error = %e, "stream status check failed, closing");
                        return;
                    }
                }
            }
        } else {
            idle_iterations = 0;
            for event in &events {
                cursor = event.id;
                if tx.send(Ok(event_frame(event))).await.is_err() {
                    return;
                }
                if is_terminal_event(event) {
                    let _ = tx.send(Ok(end_frame(cursor))).await;
                    return;
                }
            }
        }

        // Sleep, but wake immediately when the client hangs up.
        tokio::select! {
            _ = tx.closed() => return,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::types::EventLevel;

    fn event(id: i64, event_type: &str) -> ScanEvent {
        ScanEvent {
            id,
            scan_id: Uuid::new_v4(),
            seq: id,
            ts: Utc::now(),
            level: EventLevel::Info,
            event_type: event_type.to_string(),
            step_key: None,
            message: "m".to_string(),
            payload: None,
        }
    }

    #[test]
    fn test_resolve_cursor_prefers_larger() {
        let mut headers = HeaderMap::new();
        headers.insert("last-event-id", "17".parse().expect("header"));
        assert_eq!(resolve_cursor(5, &headers), 17);
        assert_eq!(resolve_cursor(40, &headers), 40);
    }

    #[test]
    fn test_resolve_cursor_ignores_garbage_header() {
        let mut headers = HeaderMap::new();
        headers.insert("last-event-id", "not-a-number".parse().expect("header"));
        assert_eq!(resolve_cursor(3, &headers), 3);
    }

    #[test]
    fn test_terminal_event_detection() {
        assert!(is_terminal_event(&event(1, "run.completed")));
        assert!(is_terminal_event(&event(1, "run.failed")));
        assert!(!is_terminal_event(&event(1, "step.completed")));
    }
}
