//! Sync queue rows.

use super::{format_datetime, parse_datetime, parse_item_kind, parse_metadata, render_metadata};
use crate::{
    DatabaseError, DatabaseResult, NewSyncQueueRow, QueueCompletion, QueueStats, QueueStatus,
    SyncQueueRow,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::time::Duration;
use sync_core::RecordIdentity;
use tracing::debug;

const QUEUE_COLUMNS: &str = "id, owner_id, item_kind, item_id, content_hash, page_identity, \
     collection_identity, sequence_number, destination, status, priority, attempt_count, \
     error_message, metadata, created_at, updated_at, scheduled_at, started_at, completed_at";

/// How long a claim waits for another writer before giving up on this tick.
const CLAIM_BUSY_TIMEOUT: Duration = Duration::from_millis(100);

/// Busy timeout restored after a claim. Matches the connection pragma.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn map_queue_row(row: &Row<'_>) -> rusqlite::Result<SyncQueueRow> {
    Ok(SyncQueueRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        item_kind: parse_item_kind(2, row.get(2)?)?,
        item_id: row.get(3)?,
        content_hash: row.get(4)?,
        page_identity: row.get(5)?,
        collection_identity: row.get(6)?,
        sequence_number: row.get(7)?,
        destination: row.get(8)?,
        status: QueueStatus::from_str(&row.get::<_, String>(9)?),
        priority: row.get(10)?,
        attempt_count: row.get(11)?,
        error_message: row.get(12)?,
        metadata: parse_metadata(row.get(13)?),
        created_at: parse_datetime(row.get(14)?),
        updated_at: parse_datetime(row.get(15)?),
        scheduled_at: parse_datetime(row.get(16)?),
        started_at: row.get::<_, Option<String>>(17)?.map(parse_datetime),
        completed_at: row.get::<_, Option<String>>(18)?.map(parse_datetime),
    })
}

/// Insert a queue row. `scheduled_at` is `now`; a row inserted as
/// `completed` also gets `completed_at = now`.
pub fn insert_queue_row(
    conn: &Connection,
    row: &NewSyncQueueRow,
    now: DateTime<Utc>,
) -> DatabaseResult<SyncQueueRow> {
    let identity = row.identity();
    let now = format_datetime(&now);
    let completed_at = row.status.is_terminal().then(|| now.clone());

    conn.execute(
        "INSERT INTO sync_queue (
            owner_id, item_kind, item_id, content_hash, identity_kind, dedup_key,
            page_identity, collection_identity, sequence_number, destination, status,
            priority, metadata, created_at, updated_at, scheduled_at, completed_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14, ?14, ?15)",
        params![
            row.owner_id,
            row.item_kind.as_str(),
            row.item_id,
            row.content_hash,
            identity.kind_label(),
            identity.key(),
            row.page_identity,
            row.collection_identity,
            row.sequence_number,
            row.destination,
            row.status.as_str(),
            row.priority,
            render_metadata(&row.metadata),
            now,
            completed_at,
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_queue_row(conn, id)?
        .ok_or_else(|| DatabaseError::NotFound("Queue row not found after insert".to_string()))
}

/// Get a queue row by ID.
pub fn get_queue_row(conn: &Connection, id: i64) -> DatabaseResult<Option<SyncQueueRow>> {
    let mut stmt =
        conn.prepare_cached(&format!("SELECT {QUEUE_COLUMNS} FROM sync_queue WHERE id = ?1"))?;

    match stmt.query_row(params![id], map_queue_row) {
        Ok(row) => Ok(Some(row)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The pending or processing row for an identity, if any.
pub fn find_active_queue_row(
    conn: &Connection,
    owner_id: &str,
    destination: &str,
    identity: &RecordIdentity,
) -> DatabaseResult<Option<SyncQueueRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {QUEUE_COLUMNS} FROM sync_queue
         WHERE owner_id = ?1 AND destination = ?2 AND identity_kind = ?3 AND dedup_key = ?4
           AND status IN ('pending', 'processing')"
    ))?;

    let result = stmt.query_row(
        params![owner_id, destination, identity.kind_label(), identity.key()],
        map_queue_row,
    );

    match result {
        Ok(row) => Ok(Some(row)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replace the content hash of an active row.
pub fn update_queue_row_hash(
    conn: &Connection,
    id: i64,
    content_hash: &str,
) -> DatabaseResult<SyncQueueRow> {
    let now = format_datetime(&Utc::now());
    conn.execute(
        "UPDATE sync_queue SET content_hash = ?1, updated_at = ?2
         WHERE id = ?3 AND status IN ('pending', 'processing')",
        params![content_hash, now, id],
    )?;
    get_queue_row(conn, id)?
        .ok_or_else(|| DatabaseError::NotFound(format!("Queue row {} not found", id)))
}

/// Pending rows due at `now`, most urgent first, FIFO within a priority.
pub fn get_next_due(
    conn: &Connection,
    limit: usize,
    now: DateTime<Utc>,
) -> DatabaseResult<Vec<SyncQueueRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {QUEUE_COLUMNS} FROM sync_queue
         WHERE status = 'pending' AND scheduled_at <= ?1
         ORDER BY priority ASC, created_at ASC, id ASC
         LIMIT ?2"
    ))?;

    let rows = stmt
        .query_map(params![format_datetime(&now), limit as i64], map_queue_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Atomically claim up to `limit` due rows for this caller.
///
/// Selection and the flip to `processing` happen in one conditional
/// `UPDATE ... RETURNING` under an immediate write transaction, committed
/// before returning. If another writer holds the lock past a short wait the
/// claim comes back empty instead of stalling the caller.
pub fn claim_due_batch(
    conn: &mut Connection,
    limit: usize,
    now: DateTime<Utc>,
) -> DatabaseResult<Vec<SyncQueueRow>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    conn.busy_timeout(CLAIM_BUSY_TIMEOUT)?;
    let claimed = claim_in_transaction(conn, limit, now);
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;

    match claimed {
        Ok(mut rows) => {
            rows.sort_by(|a, b| {
                (a.priority, a.created_at, a.id).cmp(&(b.priority, b.created_at, b.id))
            });
            Ok(rows)
        }
        Err(e) if e.is_busy() => {
            debug!(error = %e, "Queue is locked by another worker, skipping claim");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

fn claim_in_transaction(
    conn: &mut Connection,
    limit: usize,
    now: DateTime<Utc>,
) -> DatabaseResult<Vec<SyncQueueRow>> {
    let now = format_datetime(&now);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let rows = {
        let mut stmt = tx.prepare(&format!(
            "UPDATE sync_queue
             SET status = 'processing', started_at = ?1, updated_at = ?1
             WHERE status = 'pending'
               AND id IN (
                   SELECT id FROM sync_queue
                   WHERE status = 'pending' AND scheduled_at <= ?1
                   ORDER BY priority ASC, created_at ASC, id ASC
                   LIMIT ?2
               )
             RETURNING {QUEUE_COLUMNS}"
        ))?;
        let rows = stmt
            .query_map(params![now, limit as i64], map_queue_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    tx.commit()?;
    Ok(rows)
}

/// Move a processing row to `completed` after `delivered_hash` was
/// delivered.
///
/// `attempted` is false when the row finished without contacting the
/// adapter. If an admission superseded the hash while the row was
/// processing, the row is still completed, but with the delivered hash, and
/// the newer hash is kept under `superseded_hash` in its metadata.
pub fn complete_queue_row(
    conn: &Connection,
    id: i64,
    delivered_hash: &str,
    attempted: bool,
) -> DatabaseResult<QueueCompletion> {
    let current: Option<String> = conn
        .query_row(
            "SELECT content_hash FROM sync_queue WHERE id = ?1 AND status = 'processing'",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(current) = current else {
        return Ok(QueueCompletion::NotProcessing);
    };

    let now = format_datetime(&Utc::now());
    let count = conn.execute(
        "UPDATE sync_queue
         SET status = 'completed', error_message = NULL, completed_at = ?1, updated_at = ?1,
             attempt_count = attempt_count + ?2,
             metadata = CASE WHEN content_hash = ?4 THEN metadata
                        ELSE json_set(metadata, '$.superseded_hash', content_hash) END,
             content_hash = ?4
         WHERE id = ?3 AND status = 'processing'",
        params![now, attempted as i64, id, delivered_hash],
    )?;

    Ok(if count == 0 {
        QueueCompletion::NotProcessing
    } else if current == delivered_hash {
        QueueCompletion::Completed
    } else {
        QueueCompletion::Superseded {
            pending_hash: current,
        }
    })
}

/// Move a processing row to `failed`. Returns false if it was not processing.
pub fn fail_queue_row(
    conn: &Connection,
    id: i64,
    error: &str,
    attempted: bool,
) -> DatabaseResult<bool> {
    let now = format_datetime(&Utc::now());
    let count = conn.execute(
        "UPDATE sync_queue
         SET status = 'failed', error_message = ?1, completed_at = ?2, updated_at = ?2,
             attempt_count = attempt_count + ?3
         WHERE id = ?4 AND status = 'processing'",
        params![error, now, attempted as i64, id],
    )?;
    Ok(count > 0)
}

/// Cancel a pending row. Rows in any other state are left alone.
pub fn cancel_queue_row(conn: &Connection, id: i64) -> DatabaseResult<bool> {
    let now = format_datetime(&Utc::now());
    let count = conn.execute(
        "UPDATE sync_queue
         SET status = 'cancelled', completed_at = ?1, updated_at = ?1
         WHERE id = ?2 AND status = 'pending'",
        params![now, id],
    )?;
    Ok(count > 0)
}

/// Row counts per status for an owner (or everyone).
pub fn queue_stats(conn: &Connection, owner_id: Option<&str>) -> DatabaseResult<QueueStats> {
    let mut stmt = conn.prepare_cached(
        "SELECT status, COUNT(*) FROM sync_queue
         WHERE ?1 IS NULL OR owner_id = ?1
         GROUP BY status",
    )?;

    let counts = stmt
        .query_map(params![owner_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stats = QueueStats::default();
    for (status, count) in counts {
        match QueueStatus::from_str(&status) {
            QueueStatus::Pending => stats.pending = count,
            QueueStatus::Processing => stats.processing = count,
            QueueStatus::Completed => stats.completed = count,
            QueueStatus::Failed => stats.failed = count,
            QueueStatus::Cancelled => stats.cancelled = count,
        }
    }
    Ok(stats)
}
