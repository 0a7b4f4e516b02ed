mod e2e;
mod failures;

use crate::{SyncWorker, SyncWorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use sync_core::testing::RecordingAdapter;
use sync_core::{AdapterRegistry, ItemKind};
use sync_database::{
    queries, AsyncDatabase, NewDestinationConfig, NewNotebook, NewPage, SyncQueueRow, SyncRecord,
};
use sync_queue::{QueueRequest, SyncQueue};

const OWNER: &str = "owner-1";

async fn database() -> AsyncDatabase {
    AsyncDatabase::open_in_memory().await.unwrap()
}

/// Store notebook `nb-1` with the given `(page id, text)` pages, numbered
/// from 1 in order.
async fn seed_pages(db: &AsyncDatabase, pages: &[(&str, &str)]) {
    let pages: Vec<NewPage> = pages
        .iter()
        .enumerate()
        .map(|(index, (id, text))| NewPage {
            id: id.to_string(),
            owner_id: OWNER.into(),
            notebook_id: "nb-1".into(),
            page_number: index as i64 + 1,
            text: text.to_string(),
        })
        .collect();

    db.call(move |conn| {
        queries::upsert_notebook(
            conn,
            &NewNotebook {
                id: "nb-1".into(),
                owner_id: OWNER.into(),
                title: "Field notes".into(),
                last_opened_at: None,
                last_modified_at: None,
            },
        )?;
        for page in &pages {
            queries::upsert_page(conn, page)?;
        }
        Ok(())
    })
    .await
    .unwrap();
}

async fn configure(db: &AsyncDatabase, destination: &str, enabled: bool) {
    let mut config = NewDestinationConfig::new(OWNER, destination);
    config.enabled = enabled;
    config.supports_todos = true;
    db.call(move |conn| queries::upsert_destination_config(conn, &config))
        .await
        .unwrap();
}

fn worker(db: &AsyncDatabase, destination: &str, adapter: Arc<RecordingAdapter>) -> SyncWorker {
    let registry = AdapterRegistry::new();
    registry.register(destination, adapter);
    SyncWorker::new(db.clone(), registry, SyncWorkerConfig::default())
}

fn fast_config() -> SyncWorkerConfig {
    SyncWorkerConfig::default().with_poll_interval(Duration::from_millis(20))
}

async fn admit_page(db: &AsyncDatabase, page: &str, hash: &str, destination: &str) -> SyncQueueRow {
    let request = QueueRequest::new(OWNER, ItemKind::PageText, page, hash, destination)
        .with_page(page, "nb-1", 1)
        .with_priority(3);
    SyncQueue::new(db.clone()).queue_sync(request).await.unwrap()
}

async fn row(db: &AsyncDatabase, id: i64) -> SyncQueueRow {
    db.call(move |conn| queries::get_queue_row(conn, id))
        .await
        .unwrap()
        .unwrap()
}

async fn records(db: &AsyncDatabase) -> Vec<SyncRecord> {
    db.call(|conn| queries::list_records(conn, OWNER, None))
        .await
        .unwrap()
}
