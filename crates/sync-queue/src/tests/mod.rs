
use crate::{QueueRequest, SyncQueue};
use serde_json::json;
use sync_core::{ItemKind, SyncStatus};
use sync_database::{queries, AsyncDatabase, RecordUpsert};

async fn queue() -> SyncQueue {
    SyncQueue::new(AsyncDatabase::open_in_memory().await.unwrap())
}

fn page_request(page: &str, hash: &str, destination: &str) -> QueueRequest {
    QueueRequest::new("owner-1", ItemKind::PageText, page, hash, destination)
        .with_page(page, "nb-1", 1)
        .with_priority(3)
}

async fn record_delivery(queue: &SyncQueue, page: &str, hash: &str, destination: &str) {
    let record = RecordUpsert {
        owner_id: "owner-1".into(),
        item_kind: ItemKind::PageText,
        item_id: page.into(),
        content_hash: hash.into(),
        destination: destination.into(),
        destination_id: Some("ext1".into()),
        status: SyncStatus::Success,
        page_identity: Some(page.into()),
        collection_identity: Some("nb-1".into()),
        sequence_number: Some(1),
        metadata: json!({}),
        error_message: None,
    };
    queue
        .database()
        .call(move |conn| queries::upsert_record(conn, &record))
        .await
        .unwrap();
}
