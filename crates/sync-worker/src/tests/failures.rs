use super::{admit_page, configure, database, records, row, seed_pages, worker, OWNER};
use std::sync::Arc;
use std::time::Duration;
use sync_core::testing::{RecordingAdapter, Scripted};
use sync_core::{AdapterRegistry, ItemKind, SyncResult, SyncStatus};
use sync_database::QueueStatus;
use sync_queue::{QueueRequest, SyncQueue};

use crate::{SyncWorker, SyncWorkerConfig};

#[tokio::test]
async fn missing_configuration_fails_without_calling_adapter() {
    let db = database().await;
    seed_pages(&db, &[("P1", "hello")]).await;
    let adapter = Arc::new(RecordingAdapter::new("x"));
    let worker = worker(&db, "x", adapter.clone());

    let admitted = admit_page(&db, "P1", "a", "x").await;
    let report = worker.run_once().await.unwrap();
    assert_eq!(report.failed, 1);

    let failed = row(&db, admitted.id).await;
    assert_eq!(failed.status, QueueStatus::Failed);
    assert_eq!(failed.attempt_count, 0);
    assert!(failed
        .error_message
        .unwrap()
        .contains("no destination configuration"));
    assert_eq!(adapter.call_count(), 0);
    assert!(records(&db).await.is_empty());
}

#[tokio::test]
async fn disabled_destination_fails() {
    let db = database().await;
    seed_pages(&db, &[("P1", "hello")]).await;
    configure(&db, "x", false).await;
    let adapter = Arc::new(RecordingAdapter::new("x"));
    let worker = worker(&db, "x", adapter.clone());

    let admitted = admit_page(&db, "P1", "a", "x").await;
    worker.run_once().await.unwrap();

    let failed = row(&db, admitted.id).await;
    assert_eq!(failed.status, QueueStatus::Failed);
    assert!(failed.error_message.unwrap().contains("disabled"));
    assert_eq!(adapter.call_count(), 0);
}

#[tokio::test]
async fn unregistered_adapter_fails() {
    let db = database().await;
    seed_pages(&db, &[("P1", "hello")]).await;
    configure(&db, "x", true).await;
    let worker = SyncWorker::new(db.clone(), AdapterRegistry::new(), SyncWorkerConfig::default());

    let admitted = admit_page(&db, "P1", "a", "x").await;
    worker.run_once().await.unwrap();

    let failed = row(&db, admitted.id).await;
    assert_eq!(failed.status, QueueStatus::Failed);
    assert!(failed.error_message.unwrap().contains("no adapter registered"));
}

#[tokio::test]
async fn non_page_kinds_are_not_dispatched() {
    let db = database().await;
    configure(&db, "x", true).await;
    let adapter = Arc::new(RecordingAdapter::new("x"));
    let worker = worker(&db, "x", adapter.clone());

    let todo = SyncQueue::new(db.clone())
        .queue_sync(QueueRequest::new(OWNER, ItemKind::Todo, "todo-1", "t1", "x"))
        .await
        .unwrap();
    worker.run_once().await.unwrap();

    let failed = row(&db, todo.id).await;
    assert_eq!(failed.status, QueueStatus::Failed);
    assert!(failed.error_message.unwrap().contains("unsupported item kind"));
    assert_eq!(adapter.call_count(), 0);
}

#[tokio::test]
async fn missing_page_fails() {
    let db = database().await;
    configure(&db, "x", true).await;
    let adapter = Arc::new(RecordingAdapter::new("x"));
    let worker = worker(&db, "x", adapter.clone());

    let admitted = admit_page(&db, "gone", "a", "x").await;
    worker.run_once().await.unwrap();

    let failed = row(&db, admitted.id).await;
    assert_eq!(failed.status, QueueStatus::Failed);
    assert!(failed.error_message.unwrap().contains("Content not found"));
}

#[tokio::test]
async fn adapter_failure_keeps_previous_destination_id() {
    let db = database().await;
    seed_pages(&db, &[("P1", "hello")]).await;
    configure(&db, "x", true).await;
    let adapter = Arc::new(RecordingAdapter::new("x"));
    adapter.push(Scripted::Result(SyncResult::success("ext1")));
    adapter.push(Scripted::Result(SyncResult::failed("quota exceeded")));
    let worker = worker(&db, "x", adapter.clone());

    admit_page(&db, "P1", "a", "x").await;
    worker.run_once().await.unwrap();
    let changed = admit_page(&db, "P1", "b", "x").await;
    let report = worker.run_once().await.unwrap();
    assert_eq!(report.failed, 1);

    let failed = row(&db, changed.id).await;
    assert_eq!(failed.status, QueueStatus::Failed);
    assert_eq!(failed.attempt_count, 1);
    assert!(failed.error_message.unwrap().contains("quota exceeded"));

    let stored = records(&db).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, SyncStatus::Failed);
    assert_eq!(stored[0].destination_id.as_deref(), Some("ext1"));

    // Nothing re-admits the failed row, and the failed record does not
    // count as delivered.
    assert_eq!(worker.run_once().await.unwrap().claimed, 0);
    let retried = admit_page(&db, "P1", "b", "x").await;
    assert_eq!(retried.status, QueueStatus::Pending);
}

#[tokio::test]
async fn retry_result_is_recorded_as_failure() {
    let db = database().await;
    seed_pages(&db, &[("P1", "hello")]).await;
    configure(&db, "x", true).await;
    let adapter = Arc::new(RecordingAdapter::new("x"));
    adapter.push(Scripted::Result(SyncResult::retry(
        "rate limited",
        Some(Duration::from_secs(30)),
    )));
    let worker = worker(&db, "x", adapter.clone());

    let admitted = admit_page(&db, "P1", "a", "x").await;
    worker.run_once().await.unwrap();

    let failed = row(&db, admitted.id).await;
    assert_eq!(failed.status, QueueStatus::Failed);
    assert!(failed.error_message.unwrap().contains("rate limited"));
    assert_eq!(worker.run_once().await.unwrap().claimed, 0);
    assert_eq!(adapter.call_count(), 1);
}

#[tokio::test]
async fn adapter_errors_and_panics_do_not_abort_the_batch() {
    let db = database().await;
    seed_pages(&db, &[("P1", "one"), ("P2", "two"), ("P3", "three"), ("P4", "four")]).await;
    configure(&db, "x", true).await;
    let adapter = Arc::new(RecordingAdapter::new("x"));
    adapter.push(Scripted::Result(SyncResult::success("ext-1")));
    adapter.push(Scripted::Panic("adapter blew up".into()));
    adapter.push(Scripted::Error("connection reset".into()));
    let worker = worker(&db, "x", adapter.clone());

    let mut rows = Vec::new();
    for page in ["P1", "P2", "P3", "P4"] {
        rows.push(admit_page(&db, page, &format!("{page}-hash"), "x").await);
    }

    let report = worker.run_once().await.unwrap();
    assert_eq!(report.claimed, 4);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(adapter.call_count(), 4);

    let statuses: Vec<_> = {
        let mut statuses = Vec::new();
        for admitted in &rows {
            statuses.push(row(&db, admitted.id).await);
        }
        statuses
    };
    assert_eq!(statuses[0].status, QueueStatus::Completed);
    assert_eq!(statuses[1].status, QueueStatus::Failed);
    assert!(statuses[1]
        .error_message
        .as_deref()
        .unwrap()
        .contains("adapter blew up"));
    assert_eq!(statuses[2].status, QueueStatus::Failed);
    assert!(statuses[2]
        .error_message
        .as_deref()
        .unwrap()
        .contains("connection reset"));
    assert_eq!(statuses[3].status, QueueStatus::Completed);
}
