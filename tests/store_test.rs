//! Tests for the scan store: event sequencing, job-queue claims, and scan
//! status transitions.

use std::sync::Arc;

use tokenhound::store::Db;
use tokenhound::types::{EventLevel, JobStatus, ScanStatus};
use uuid::Uuid;

async fn open_temp_db() -> (Arc<Db>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("test_scans.db");
    let db = Db::open(db_path.to_str().expect("path"))
        .await
        .expect("open db");
    (Arc::new(db), dir)
}

async fn insert_scan(db: &Db) -> Uuid {
    let id = Uuid::new_v4();
    db.insert_queued_scan(
        id,
        "base",
        "0xf43eb8de897fbc7f2502483b2bef7bb9ea179229",
        "0.1.0",
        "1",
    )
    .await
    .expect("insert scan");
    id
}

// ── Events ──────────────────────────────────────────────────────

#[tokio::test]
async fn append_assigns_contiguous_seq() {
    let (db, _dir) = open_temp_db().await;
    let scan_id = insert_scan(&db).await;

    for i in 0..5 {
        let event = db
            .append_event(
                scan_id,
                EventLevel::Info,
                "log.line",
                None,
                &format!("event {i}"),
                None,
            )
            .await
            .expect("append");
        assert_eq!(event.seq, i + 1);
    }

    let events = db.list_events(scan_id).await.expect("list");
    let seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn concurrent_appends_keep_seq_contiguous() {
    let (db, _dir) = open_temp_db().await;
    let scan_id = insert_scan(&db).await;

    let mut handles = Vec::new();
    for task in 0..4 {
        let db = Arc::clone(&db);
        handles.push(tokio::spawn(async move {
            for i in 0..5 {
                db.append_event(
                    scan_id,
                    EventLevel::Info,
                    "log.line",
                    None,
                    &format!("task {task} event {i}"),
                    None,
                )
                .await
                .expect("append");
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task");
    }

    let events = db.list_events(scan_id).await.expect("list");
    assert_eq!(events.len(), 20);

    // The multiset of seqs is exactly 1..=20 with no gaps.
    let mut seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=20).collect::<Vec<i64>>());

    // Timestamps are monotone in seq order.
    let mut by_seq = events.clone();
    by_seq.sort_by_key(|e| e.seq);
    for pair in by_seq.windows(2) {
        assert!(pair[0].ts <= pair[1].ts);
        assert!(pair[0].id < pair[1].id);
    }
}

#[tokio::test]
async fn list_events_after_filters_by_global_id() {
    let (db, _dir) = open_temp_db().await;
    let scan_id = insert_scan(&db).await;

    let mut ids = Vec::new();
    for i in 0..4 {
        let event = db
            .append_event(scan_id, EventLevel::Info, "log.line", None, &format!("{i}"), None)
            .await
            .expect("append");
        ids.push(event.id);
    }

    let tail = db.list_events_after(scan_id, ids[1]).await.expect("list");
    assert_eq!(tail.len(), 2);
    assert!(tail.iter().all(|e| e.id > ids[1]));

    let all = db.list_events_after(scan_id, 0).await.expect("list");
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn latest_event_returns_newest() {
    let (db, _dir) = open_temp_db().await;
    let scan_id = insert_scan(&db).await;

    assert!(db.latest_event(scan_id).await.expect("latest").is_none());
    for message in ["first", "second", "third"] {
        db.append_event(scan_id, EventLevel::Info, "log.line", None, message, None)
            .await
            .expect("append");
    }
    let latest = db.latest_event(scan_id).await.expect("latest").expect("some");
    assert_eq!(latest.message, "third");
    assert_eq!(latest.seq, 3);
}

#[tokio::test]
async fn events_are_scoped_per_scan() {
    let (db, _dir) = open_temp_db().await;
    let scan_a = insert_scan(&db).await;
    let scan_b = insert_scan(&db).await;

    db.append_event(scan_a, EventLevel::Info, "log.line", None, "a1", None)
        .await
        .expect("append");
    db.append_event(scan_b, EventLevel::Info, "log.line", None, "b1", None)
        .await
        .expect("append");
    db.append_event(scan_b, EventLevel::Info, "log.line", None, "b2", None)
        .await
        .expect("append");

    // Seq restarts per scan.
    let events_b = db.list_events(scan_b).await.expect("list");
    assert_eq!(events_b.len(), 2);
    assert_eq!(events_b[0].seq, 1);
    assert_eq!(events_b[1].seq, 2);
}

// ── Jobs ────────────────────────────────────────────────────────

#[tokio::test]
async fn enqueue_is_idempotent_while_active() {
    let (db, _dir) = open_temp_db().await;
    let scan_id = insert_scan(&db).await;

    let first = db.enqueue_job(scan_id).await.expect("enqueue");
    assert!(first.enqueued);
    assert_eq!(first.job.status, JobStatus::Pending);

    let second = db.enqueue_job(scan_id).await.expect("enqueue");
    assert!(!second.enqueued);
    assert_eq!(second.job.id, first.job.id);

    // Still idempotent while the job is running.
    let claimed = db.claim_next_job().await.expect("claim").expect("job");
    assert_eq!(claimed.id, first.job.id);
    let third = db.enqueue_job(scan_id).await.expect("enqueue");
    assert!(!third.enqueued);
    assert_eq!(third.job.id, first.job.id);
}

#[tokio::test]
async fn enqueue_after_terminal_job_inserts_fresh_row() {
    let (db, _dir) = open_temp_db().await;
    let scan_id = insert_scan(&db).await;

    let first = db.enqueue_job(scan_id).await.expect("enqueue");
    let claimed = db.claim_next_job().await.expect("claim").expect("job");
    db.finalize_job(claimed.id, JobStatus::Completed, None)
        .await
        .expect("finalize");

    let second = db.enqueue_job(scan_id).await.expect("enqueue");
    assert!(second.enqueued);
    assert_ne!(second.job.id, first.job.id);
}

#[tokio::test]
async fn claim_is_won_by_exactly_one_caller() {
    let (db, _dir) = open_temp_db().await;
    let scan_id = insert_scan(&db).await;
    db.enqueue_job(scan_id).await.expect("enqueue");

    let mut handles = Vec::new();
    for _ in 0..5 {
        let db = Arc::clone(&db);
        handles.push(tokio::spawn(async move {
            db.claim_next_job().await.expect("claim")
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.expect("task").is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn claim_takes_oldest_pending_first() {
    let (db, _dir) = open_temp_db().await;
    let scan_a = insert_scan(&db).await;
    let scan_b = insert_scan(&db).await;

    let job_a = db.enqueue_job(scan_a).await.expect("enqueue").job;
    let _job_b = db.enqueue_job(scan_b).await.expect("enqueue").job;

    let claimed = db.claim_next_job().await.expect("claim").expect("job");
    assert_eq!(claimed.id, job_a.id);
    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.attempt, 1);
}

#[tokio::test]
async fn claim_on_empty_queue_returns_none() {
    let (db, _dir) = open_temp_db().await;
    assert!(db.claim_next_job().await.expect("claim").is_none());
}

// ── Scans ───────────────────────────────────────────────────────

#[tokio::test]
async fn scan_claim_is_compare_and_swap() {
    let (db, _dir) = open_temp_db().await;
    let scan_id = insert_scan(&db).await;

    let claimed = db.claim_scan_for_run(scan_id).await.expect("claim");
    assert_eq!(claimed.expect("scan").status, ScanStatus::Running);

    // A second claim observes the running status and loses.
    let second = db.claim_scan_for_run(scan_id).await.expect("claim");
    assert!(second.is_none());
}

#[tokio::test]
async fn complete_scan_persists_artifacts() {
    let (db, _dir) = open_temp_db().await;
    let scan_id = insert_scan(&db).await;
    db.claim_scan_for_run(scan_id).await.expect("claim");

    let evidence = serde_json::json!({ "items": [] });
    let assessment = serde_json::json!({ "overallScore": 22 });
    db.complete_scan(scan_id, 1500, &evidence, &assessment, "Low risk", Some("llama-3.3-70b"))
        .await
        .expect("complete");

    let scan = db.get_scan(scan_id).await.expect("get").expect("scan");
    assert_eq!(scan.status, ScanStatus::Complete);
    assert_eq!(scan.duration_ms, Some(1500));
    assert_eq!(scan.narrative.as_deref(), Some("Low risk"));
    assert_eq!(scan.model_id.as_deref(), Some("llama-3.3-70b"));
    assert_eq!(scan.assessment.expect("assessment")["overallScore"], 22);
}

#[tokio::test]
async fn complete_requires_running_status() {
    let (db, _dir) = open_temp_db().await;
    let scan_id = insert_scan(&db).await;

    // Still queued: the CAS must refuse.
    let result = db
        .complete_scan(
            scan_id,
            10,
            &serde_json::json!({}),
            &serde_json::json!({}),
            "x",
            None,
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn fail_scan_keeps_partial_evidence() {
    let (db, _dir) = open_temp_db().await;
    let scan_id = insert_scan(&db).await;
    db.claim_scan_for_run(scan_id).await.expect("claim");

    let partial = serde_json::json!({ "items": [{ "id": "ev_rpc_00000001" }] });
    db.fail_scan(scan_id, 900, Some(&partial), "Address does not contain contract bytecode on Base")
        .await
        .expect("fail");

    let scan = db.get_scan(scan_id).await.expect("get").expect("scan");
    assert_eq!(scan.status, ScanStatus::Failed);
    assert!(scan.error.expect("error").contains("bytecode"));
    assert_eq!(scan.evidence.expect("evidence")["items"][0]["id"], "ev_rpc_00000001");
}

#[tokio::test]
async fn latest_complete_scan_is_per_token() {
    let (db, _dir) = open_temp_db().await;

    let token_a = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    let id_a = Uuid::new_v4();
    db.insert_queued_scan(id_a, "base", token_a, "0.1.0", "1")
        .await
        .expect("insert");
    db.claim_scan_for_run(id_a).await.expect("claim");
    db.complete_scan(id_a, 10, &serde_json::json!({}), &serde_json::json!({}), "ok", None)
        .await
        .expect("complete");

    let found = db
        .latest_complete_scan("base", token_a)
        .await
        .expect("lookup")
        .expect("scan");
    assert_eq!(found.id, id_a);

    let other = db
        .latest_complete_scan("base", "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
        .await
        .expect("lookup");
    assert!(other.is_none());

    // Queued/failed scans never serve the cache path.
    let id_b = Uuid::new_v4();
    db.insert_queued_scan(id_b, "base", token_a, "0.1.0", "1")
        .await
        .expect("insert");
    let still_a = db
        .latest_complete_scan("base", token_a)
        .await
        .expect("lookup")
        .expect("scan");
    assert_eq!(still_a.id, id_a);
}

#[tokio::test]
async fn delete_scan_cascades_to_events_and_jobs() {
    let (db, _dir) = open_temp_db().await;
    let scan_id = insert_scan(&db).await;
    db.enqueue_job(scan_id).await.expect("enqueue");
    db.append_event(scan_id, EventLevel::Info, "run.started", None, "Scan started", None)
        .await
        .expect("append");

    db.delete_scan(scan_id).await.expect("delete");

    assert!(db.get_scan(scan_id).await.expect("get").is_none());
    assert!(db.list_events(scan_id).await.expect("list").is_empty());
    assert!(db
        .active_job_for_scan(scan_id)
        .await
        .expect("active")
        .is_none());
}
