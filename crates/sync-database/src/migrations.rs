//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_content(conn)?;
    }
    if current_version < 2 {
        migrate_v2_destination_configs(conn)?;
    }
    if current_version < 3 {
        migrate_v3_sync_records_and_queue(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: notebooks and their pages.
fn migrate_v1_content(conn: &Connection) -> DatabaseResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS notebooks (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            last_opened_at TEXT,
            last_modified_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notebooks_owner ON notebooks(owner_id);

        CREATE TABLE IF NOT EXISTS pages (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            notebook_id TEXT NOT NULL REFERENCES notebooks(id) ON DELETE CASCADE,
            page_number INTEGER NOT NULL,
            text TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_pages_notebook ON pages(notebook_id, page_number);
        ",
    )?;

    record_migration(conn, 1, "content")?;
    Ok(())
}

/// V2: per-owner destination configuration with sealed credentials.
fn migrate_v2_destination_configs(conn: &Connection) -> DatabaseResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS destination_configs (
            owner_id TEXT NOT NULL,
            destination TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            todo_only INTEGER NOT NULL DEFAULT 0,
            supports_todos INTEGER NOT NULL DEFAULT 0,
            credential_ciphertext BLOB,
            credential_nonce BLOB,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (owner_id, destination)
        );
        ",
    )?;

    record_migration(conn, 2, "destination_configs")?;
    Ok(())
}

/// V3: delivery records and the sync queue.
///
/// Both tables carry `identity_kind` ('page' | 'content') and `dedup_key`
/// (page identity or content hash). Records are unique per key; queue rows
/// are unique per key only while pending or processing.
fn migrate_v3_sync_records_and_queue(conn: &Connection) -> DatabaseResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sync_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            item_kind TEXT NOT NULL,
            item_id TEXT NOT NULL,
            identity_kind TEXT NOT NULL CHECK (identity_kind IN ('page', 'content')),
            dedup_key TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            destination TEXT NOT NULL,
            destination_id TEXT,
            status TEXT NOT NULL,
            page_identity TEXT,
            collection_identity TEXT,
            sequence_number INTEGER,
            metadata TEXT NOT NULL DEFAULT '{}',
            error_message TEXT,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            delivered_at TEXT,
            UNIQUE (owner_id, destination, identity_kind, dedup_key)
        );

        CREATE INDEX IF NOT EXISTS idx_sync_records_item
            ON sync_records(owner_id, destination, item_kind, item_id);

        CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            item_kind TEXT NOT NULL,
            item_id TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            identity_kind TEXT NOT NULL CHECK (identity_kind IN ('page', 'content')),
            dedup_key TEXT NOT NULL,
            page_identity TEXT,
            collection_identity TEXT,
            sequence_number INTEGER,
            destination TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'completed', 'failed', 'cancelled')),
            priority INTEGER NOT NULL DEFAULT 5 CHECK (priority BETWEEN 1 AND 10),
            attempt_count INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            scheduled_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_queue_active_identity
            ON sync_queue(owner_id, destination, identity_kind, dedup_key)
            WHERE status IN ('pending', 'processing');

        CREATE INDEX IF NOT EXISTS idx_sync_queue_due
            ON sync_queue(status, scheduled_at, priority, created_at, id);
        ",
    )?;

    record_migration(conn, 3, "sync_records_and_queue")?;
    Ok(())
}
