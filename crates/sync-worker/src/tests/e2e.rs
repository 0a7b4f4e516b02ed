use super::{admit_page, configure, database, records, row, seed_pages, worker, OWNER};
use crate::{SyncWorker, SyncWorkerConfig};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use sync_core::testing::{RecordingAdapter, Scripted};
use sync_core::{
    AdapterRegistry, AdapterResult, DestinationAdapter, ItemKind, RecordIdentity, SyncItem,
    SyncResult, SyncStatus, TargetInfo, METADATA_CONTAINER_CREATED, METADATA_CONTAINER_ID,
};
use sync_database::{queries, AsyncDatabase, NewSyncQueueRow, QueueStatus, RecordUpsert};

#[tokio::test]
async fn page_is_delivered_then_updated_in_place() {
    let db = database().await;
    seed_pages(&db, &[("P1", "hello")]).await;
    configure(&db, "x", true).await;
    let adapter = Arc::new(RecordingAdapter::new("x"));
    adapter.push(Scripted::Result(SyncResult::success("ext1")));
    let worker = worker(&db, "x", adapter.clone());

    // 1. admit
    let first = admit_page(&db, "P1", "a", "x").await;
    assert_eq!(first.status, QueueStatus::Pending);
    assert_eq!(first.priority, 3);

    // 2. deliver
    let report = worker.run_once().await.unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(row(&db, first.id).await.status, QueueStatus::Completed);

    let stored = records(&db).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].destination_id.as_deref(), Some("ext1"));
    assert_eq!(stored[0].content_hash, "a");
    assert_eq!(stored[0].status, SyncStatus::Success);
    assert!(stored[0].delivered_at.is_some());

    // 3. same content again: short-circuit, no adapter call
    let again = admit_page(&db, "P1", "a", "x").await;
    assert_eq!(again.status, QueueStatus::Completed);
    assert_ne!(again.id, first.id);
    assert_eq!(worker.run_once().await.unwrap().claimed, 0);
    assert_eq!(adapter.call_count(), 1);

    // 4. changed content
    let changed = admit_page(&db, "P1", "b", "x").await;
    assert_eq!(changed.status, QueueStatus::Pending);

    // 5. update path
    worker.run_once().await.unwrap();
    let calls = adapter.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].existing_destination_id.as_deref(), Some("ext1"));
    assert_eq!(calls[1].content_hash.as_deref(), Some("b"));
    assert_eq!(calls[1].page_identity.as_deref(), Some("P1"));

    let stored = records(&db).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].identity(), RecordIdentity::Page("P1".into()));
    assert_eq!(stored[0].content_hash, "b");
    assert_eq!(stored[0].attempt_count, 2);
    assert_eq!(row(&db, changed.id).await.status, QueueStatus::Completed);
}

#[tokio::test]
async fn delivered_content_completes_without_adapter_call() {
    let db = database().await;
    seed_pages(&db, &[("P1", "hello")]).await;
    configure(&db, "x", true).await;
    let adapter = Arc::new(RecordingAdapter::new("x"));
    let worker = worker(&db, "x", adapter.clone());

    // A row admitted before the matching delivery was recorded.
    let pending = db
        .call(|conn| {
            let row = queries::insert_queue_row(
                conn,
                &NewSyncQueueRow {
                    owner_id: OWNER.into(),
                    item_kind: ItemKind::PageText,
                    item_id: "P1".into(),
                    content_hash: "a".into(),
                    page_identity: Some("P1".into()),
                    collection_identity: Some("nb-1".into()),
                    sequence_number: Some(1),
                    destination: "x".into(),
                    status: QueueStatus::Pending,
                    priority: 3,
                    metadata: json!({}),
                },
                chrono::Utc::now(),
            )?;
            queries::upsert_record(
                conn,
                &RecordUpsert {
                    owner_id: OWNER.into(),
                    item_kind: ItemKind::PageText,
                    item_id: "P1".into(),
                    content_hash: "a".into(),
                    destination: "x".into(),
                    destination_id: Some("ext1".into()),
                    status: SyncStatus::Success,
                    page_identity: Some("P1".into()),
                    collection_identity: Some("nb-1".into()),
                    sequence_number: Some(1),
                    metadata: json!({}),
                    error_message: None,
                },
            )?;
            Ok(row)
        })
        .await
        .unwrap();

    let report = worker.run_once().await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(adapter.call_count(), 0);

    let finished = row(&db, pending.id).await;
    assert_eq!(finished.status, QueueStatus::Completed);
    assert_eq!(finished.attempt_count, 0);
}

#[tokio::test]
async fn container_record_is_created_once_and_reused() {
    let db = database().await;
    seed_pages(&db, &[("P1", "one"), ("P2", "two")]).await;
    configure(&db, "x", true).await;
    let adapter = Arc::new(RecordingAdapter::new("x"));
    adapter.push(Scripted::Result(
        SyncResult::success("ext-p1")
            .with_metadata(METADATA_CONTAINER_ID, json!("db-1"))
            .with_metadata(METADATA_CONTAINER_CREATED, json!(true)),
    ));
    let worker = worker(&db, "x", adapter.clone());

    admit_page(&db, "P1", "h1", "x").await;
    admit_page(&db, "P2", "h2", "x").await;
    let report = worker.run_once().await.unwrap();
    assert_eq!(report.delivered, 2);

    let calls = adapter.calls();
    assert_eq!(calls[0].existing_container_id, None);
    assert_eq!(calls[1].existing_container_id.as_deref(), Some("db-1"));

    let container = db
        .call(|conn| queries::find_collection_record(conn, OWNER, "x", "nb-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(container.item_kind, ItemKind::Notebook);
    assert_eq!(container.destination_id.as_deref(), Some("db-1"));

    // A second container signal does not add another collection record.
    adapter.push(Scripted::Result(
        SyncResult::success("ext-p1")
            .with_metadata(METADATA_CONTAINER_ID, json!("db-2"))
            .with_metadata(METADATA_CONTAINER_CREATED, json!(true)),
    ));
    admit_page(&db, "P1", "h1-edited", "x").await;
    worker.run_once().await.unwrap();

    let notebooks: Vec<_> = records(&db)
        .await
        .into_iter()
        .filter(|record| record.item_kind == ItemKind::Notebook)
        .collect();
    assert_eq!(notebooks.len(), 1);
    assert_eq!(notebooks[0].destination_id.as_deref(), Some("db-1"));
}

/// Adapter that edits the page (re-admitting it with a new hash) while the
/// worker is delivering it.
struct EditingAdapter {
    db: AsyncDatabase,
}

#[async_trait]
impl DestinationAdapter for EditingAdapter {
    async fn sync_item(&self, item: &SyncItem) -> AdapterResult<SyncResult> {
        let admitted = admit_page(&self.db, &item.item_id, "b", "x").await;
        assert_eq!(admitted.status, QueueStatus::Processing);
        Ok(SyncResult::success("ext1"))
    }

    async fn check_duplicate(&self, _hash: &str) -> AdapterResult<Option<String>> {
        Ok(None)
    }

    async fn update_item(
        &self,
        destination_id: &str,
        _item: &SyncItem,
    ) -> AdapterResult<SyncResult> {
        Ok(SyncResult::success(destination_id))
    }

    async fn delete_item(&self, destination_id: &str) -> AdapterResult<SyncResult> {
        Ok(SyncResult::success(destination_id))
    }

    async fn get_target_info(&self) -> AdapterResult<TargetInfo> {
        Ok(TargetInfo {
            name: "x".into(),
            connected: true,
            capabilities: vec!["page_text".into()],
            details: serde_json::Map::new(),
        })
    }
}

#[tokio::test]
async fn hash_superseded_during_delivery_is_not_marked_delivered() {
    let db = database().await;
    seed_pages(&db, &[("P1", "hello")]).await;
    configure(&db, "x", true).await;
    let registry = AdapterRegistry::new();
    registry.register("x", Arc::new(EditingAdapter { db: db.clone() }));
    let editing = SyncWorker::new(db.clone(), registry, SyncWorkerConfig::default());

    let first = admit_page(&db, "P1", "a", "x").await;
    let report = editing.run_once().await.unwrap();
    assert_eq!(report.delivered, 1);

    // The row and the record agree on what was actually delivered.
    let finished = row(&db, first.id).await;
    assert_eq!(finished.status, QueueStatus::Completed);
    assert_eq!(finished.content_hash, "a");
    assert_eq!(finished.metadata["superseded_hash"], "b");
    let stored = records(&db).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content_hash, "a");

    // Admitting the newer content again schedules it.
    let retry = admit_page(&db, "P1", "b", "x").await;
    assert_eq!(retry.status, QueueStatus::Pending);
    assert_ne!(retry.id, first.id);

    let adapter = Arc::new(RecordingAdapter::new("x"));
    worker(&db, "x", adapter.clone()).run_once().await.unwrap();
    assert_eq!(adapter.calls()[0].existing_destination_id.as_deref(), Some("ext1"));
    assert_eq!(records(&db).await[0].content_hash, "b");
}
