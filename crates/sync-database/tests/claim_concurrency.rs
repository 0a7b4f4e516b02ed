//! Two connections to one database file claiming the same pending set.

use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use sync_core::ItemKind;
use sync_database::{queries, AsyncDatabase, NewSyncQueueRow, QueueStatus};
use tempfile::tempdir;

const ROWS: usize = 40;

fn row(n: usize) -> NewSyncQueueRow {
    NewSyncQueueRow {
        owner_id: "owner-1".into(),
        item_kind: ItemKind::PageText,
        item_id: format!("page-{}", n),
        content_hash: format!("hash-{}", n),
        page_identity: Some(format!("page-{}", n)),
        collection_identity: Some("nb-1".into()),
        sequence_number: Some(n as i64),
        destination: "notes".into(),
        status: QueueStatus::Pending,
        priority: (n % 10 + 1) as i32,
        metadata: json!({}),
    }
}

#[tokio::test]
async fn concurrent_claims_return_disjoint_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let first = AsyncDatabase::open(&path).await.unwrap();
    let second = AsyncDatabase::open(&path).await.unwrap();

    first
        .call(|conn| {
            for n in 0..ROWS {
                queries::insert_queue_row(conn, &row(n), Utc::now())?;
            }
            Ok(())
        })
        .await
        .unwrap();

    let mut seen = HashSet::new();
    for _ in 0..50 {
        let (a, b) = tokio::join!(
            first.call(|conn| queries::claim_due_batch(conn, 7, Utc::now())),
            second.call(|conn| queries::claim_due_batch(conn, 7, Utc::now())),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        if a.is_empty() && b.is_empty() && seen.len() == ROWS {
            break;
        }
        for claimed in a.iter().chain(b.iter()) {
            assert_eq!(claimed.status, QueueStatus::Processing);
            assert!(seen.insert(claimed.id), "row {} claimed twice", claimed.id);
        }
    }

    assert_eq!(seen.len(), ROWS);
    let stats = second
        .call(|conn| queries::queue_stats(conn, None))
        .await
        .unwrap();
    assert_eq!(stats.processing as usize, ROWS);
    assert_eq!(stats.pending, 0);
}
