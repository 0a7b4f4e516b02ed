//! Sync records: one row per (owner, destination, identity).

use super::{
    format_datetime, parse_datetime, parse_item_kind, parse_metadata, parse_sync_status,
    render_metadata,
};
use crate::{DatabaseError, DatabaseResult, RecordUpsert, SyncRecord};
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use sync_core::{ItemKind, RecordIdentity, SyncStatus};

const RECORD_COLUMNS: &str = "id, owner_id, item_kind, item_id, content_hash, destination, \
     destination_id, status, page_identity, collection_identity, sequence_number, metadata, \
     error_message, attempt_count, created_at, updated_at, delivered_at";

fn map_record(row: &Row<'_>) -> rusqlite::Result<SyncRecord> {
    Ok(SyncRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        item_kind: parse_item_kind(2, row.get(2)?)?,
        item_id: row.get(3)?,
        content_hash: row.get(4)?,
        destination: row.get(5)?,
        destination_id: row.get(6)?,
        status: parse_sync_status(row.get(7)?),
        page_identity: row.get(8)?,
        collection_identity: row.get(9)?,
        sequence_number: row.get(10)?,
        metadata: parse_metadata(row.get(11)?),
        error_message: row.get(12)?,
        attempt_count: row.get(13)?,
        created_at: parse_datetime(row.get(14)?),
        updated_at: parse_datetime(row.get(15)?),
        delivered_at: row.get::<_, Option<String>>(16)?.map(parse_datetime),
    })
}

/// Find the record for an identity at a destination.
pub fn find_record(
    conn: &Connection,
    owner_id: &str,
    destination: &str,
    identity: &RecordIdentity,
) -> DatabaseResult<Option<SyncRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {RECORD_COLUMNS} FROM sync_records
         WHERE owner_id = ?1 AND destination = ?2 AND identity_kind = ?3 AND dedup_key = ?4"
    ))?;

    let result = stmt.query_row(
        params![owner_id, destination, identity.kind_label(), identity.key()],
        map_record,
    );

    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Find the newest notebook-level record for a collection.
///
/// Notebook records are keyed by content hash, so a collection may have
/// several over time; the most recently updated one carries the current
/// container id.
pub fn find_collection_record(
    conn: &Connection,
    owner_id: &str,
    destination: &str,
    collection_identity: &str,
) -> DatabaseResult<Option<SyncRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {RECORD_COLUMNS} FROM sync_records
         WHERE owner_id = ?1 AND destination = ?2 AND item_kind = ?3 AND item_id = ?4
         ORDER BY updated_at DESC, id DESC
         LIMIT 1"
    ))?;

    let result = stmt.query_row(
        params![
            owner_id,
            destination,
            ItemKind::Notebook.as_str(),
            collection_identity
        ],
        map_record,
    );

    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Insert or update the record for this write's identity.
///
/// On conflict the record is updated in place: `attempt_count` grows by
/// one, a missing destination id keeps the stored one, and `delivered_at`
/// only moves on success.
pub fn upsert_record(conn: &Connection, record: &RecordUpsert) -> DatabaseResult<SyncRecord> {
    let identity = record.identity();
    let now = format_datetime(&Utc::now());
    let delivered_at = (record.status == SyncStatus::Success).then(|| now.clone());

    conn.execute(
        "INSERT INTO sync_records (
            owner_id, item_kind, item_id, identity_kind, dedup_key, content_hash, destination,
            destination_id, status, page_identity, collection_identity, sequence_number,
            metadata, error_message, attempt_count, created_at, updated_at, delivered_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 1, ?15, ?15, ?16)
         ON CONFLICT (owner_id, destination, identity_kind, dedup_key) DO UPDATE SET
            item_kind = excluded.item_kind,
            item_id = excluded.item_id,
            content_hash = excluded.content_hash,
            destination_id = COALESCE(excluded.destination_id, sync_records.destination_id),
            status = excluded.status,
            page_identity = excluded.page_identity,
            collection_identity = excluded.collection_identity,
            sequence_number = excluded.sequence_number,
            metadata = excluded.metadata,
            error_message = excluded.error_message,
            attempt_count = sync_records.attempt_count + 1,
            updated_at = excluded.updated_at,
            delivered_at = COALESCE(excluded.delivered_at, sync_records.delivered_at)",
        params![
            record.owner_id,
            record.item_kind.as_str(),
            record.item_id,
            identity.kind_label(),
            identity.key(),
            record.content_hash,
            record.destination,
            record.destination_id,
            record.status.as_str(),
            record.page_identity,
            record.collection_identity,
            record.sequence_number,
            render_metadata(&record.metadata),
            record.error_message,
            now,
            delivered_at,
        ],
    )?;

    find_record(conn, &record.owner_id, &record.destination, &identity)?
        .ok_or_else(|| DatabaseError::NotFound("Sync record not found after upsert".to_string()))
}

/// List an owner's records, optionally for one destination.
pub fn list_records(
    conn: &Connection,
    owner_id: &str,
    destination: Option<&str>,
) -> DatabaseResult<Vec<SyncRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {RECORD_COLUMNS} FROM sync_records
         WHERE owner_id = ?1 AND (?2 IS NULL OR destination = ?2)
         ORDER BY id ASC"
    ))?;

    let records = stmt
        .query_map(params![owner_id, destination], map_record)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Count records per status for an owner (or everyone).
pub fn count_records_by_status(
    conn: &Connection,
    owner_id: Option<&str>,
) -> DatabaseResult<Vec<(SyncStatus, i64)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT status, COUNT(*) FROM sync_records
         WHERE ?1 IS NULL OR owner_id = ?1
         GROUP BY status
         ORDER BY status",
    )?;

    let counts = stmt
        .query_map(params![owner_id], |row| {
            Ok((parse_sync_status(row.get(0)?), row.get(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::conn;
    use serde_json::json;

    fn page_write(hash: &str, status: SyncStatus, destination_id: Option<&str>) -> RecordUpsert {
        RecordUpsert {
            owner_id: "owner-1".into(),
            item_kind: ItemKind::PageText,
            item_id: "page-1".into(),
            content_hash: hash.into(),
            destination: "notes".into(),
            destination_id: destination_id.map(str::to_string),
            status,
            page_identity: Some("page-1".into()),
            collection_identity: Some("nb-1".into()),
            sequence_number: Some(1),
            metadata: json!({}),
            error_message: None,
        }
    }

    #[test]
    fn page_records_upsert_in_place() {
        let conn = conn();
        let first = upsert_record(&conn, &page_write("a", SyncStatus::Success, Some("ext1"))).unwrap();
        let second = upsert_record(&conn, &page_write("b", SyncStatus::Success, Some("ext1"))).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.content_hash, "b");
        assert_eq!(second.attempt_count, 2);
        assert_eq!(list_records(&conn, "owner-1", None).unwrap().len(), 1);
    }

    #[test]
    fn failure_keeps_previous_destination_id() {
        let conn = conn();
        upsert_record(&conn, &page_write("a", SyncStatus::Success, Some("ext1"))).unwrap();

        let mut failed = page_write("b", SyncStatus::Failed, None);
        failed.error_message = Some("timeout".into());
        let record = upsert_record(&conn, &failed).unwrap();

        assert_eq!(record.status, SyncStatus::Failed);
        assert_eq!(record.destination_id.as_deref(), Some("ext1"));
        assert_eq!(record.error_message.as_deref(), Some("timeout"));
        assert!(record.delivered_at.is_some());
        assert!(!record.delivered("b"));
    }

    #[test]
    fn content_records_are_keyed_by_hash() {
        let conn = conn();
        let todo = |hash: &str| RecordUpsert {
            item_kind: ItemKind::Todo,
            item_id: "todo-1".into(),
            page_identity: None,
            collection_identity: None,
            sequence_number: None,
            ..page_write(hash, SyncStatus::Success, Some("t"))
        };
        upsert_record(&conn, &todo("h1")).unwrap();
        upsert_record(&conn, &todo("h2")).unwrap();
        assert_eq!(list_records(&conn, "owner-1", Some("notes")).unwrap().len(), 2);

        let found = find_record(
            &conn,
            "owner-1",
            "notes",
            &RecordIdentity::Content("h1".into()),
        )
        .unwrap()
        .unwrap();
        assert!(found.delivered("h1"));
        assert!(find_record(&conn, "owner-1", "other", &RecordIdentity::Content("h1".into()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn collection_record_lookup_by_item_id() {
        let conn = conn();
        assert!(find_collection_record(&conn, "owner-1", "notes", "nb-1")
            .unwrap()
            .is_none());

        let notebook = RecordUpsert {
            item_kind: ItemKind::Notebook,
            item_id: "nb-1".into(),
            page_identity: None,
            collection_identity: None,
            sequence_number: None,
            ..page_write("nbhash", SyncStatus::Success, Some("db-9"))
        };
        upsert_record(&conn, &notebook).unwrap();

        let record = find_collection_record(&conn, "owner-1", "notes", "nb-1")
            .unwrap()
            .unwrap();
        assert_eq!(record.destination_id.as_deref(), Some("db-9"));
    }

    #[test]
    fn counts_group_by_status() {
        let conn = conn();
        upsert_record(&conn, &page_write("a", SyncStatus::Success, Some("x"))).unwrap();
        let counts = count_records_by_status(&conn, Some("owner-1")).unwrap();
        assert_eq!(counts, vec![(SyncStatus::Success, 1)]);
        assert!(count_records_by_status(&conn, Some("nobody")).unwrap().is_empty());
    }
}
