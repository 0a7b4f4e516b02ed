
use crate::UnifiedSyncManager;
use serde_json::json;
use sync_core::{AdapterRegistry, ItemKind, SyncItem};
use sync_database::{queries, AsyncDatabase, SyncRecord};

const OWNER: &str = "owner-1";

async fn manager() -> UnifiedSyncManager {
    let db = AsyncDatabase::open_in_memory().await.unwrap();
    UnifiedSyncManager::new(db, AdapterRegistry::new())
}

fn todo(id: &str, text: &str) -> SyncItem {
    SyncItem::new(
        OWNER,
        ItemKind::Todo,
        id,
        json!({ "text": text, "collection_identity": "nb-1", "sequence_number": 2 }),
    )
}

fn page(id: &str, hash: &str) -> SyncItem {
    SyncItem::new(
        OWNER,
        ItemKind::PageText,
        id,
        json!({ "collection_identity": "nb-1", "sequence_number": 1, "text": "body" }),
    )
    .with_content_hash(hash)
    .with_page(id, "nb-1", 1)
}

async fn records(manager: &UnifiedSyncManager) -> Vec<SyncRecord> {
    manager
        .database()
        .call(|conn| queries::list_records(conn, OWNER, None))
        .await
        .unwrap()
}
