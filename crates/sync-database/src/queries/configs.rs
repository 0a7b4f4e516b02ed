//! Destination configurations.

use super::{format_datetime, parse_datetime};
use crate::{DatabaseError, DatabaseResult, DestinationConfig, NewDestinationConfig};
use chrono::Utc;
use rusqlite::{params, Connection, Row};

const CONFIG_COLUMNS: &str = "owner_id, destination, enabled, todo_only, supports_todos, \
     credential_ciphertext, credential_nonce, created_at, updated_at";

fn map_config(row: &Row<'_>) -> rusqlite::Result<DestinationConfig> {
    Ok(DestinationConfig {
        owner_id: row.get(0)?,
        destination: row.get(1)?,
        enabled: row.get(2)?,
        todo_only: row.get(3)?,
        supports_todos: row.get(4)?,
        credential_ciphertext: row.get(5)?,
        credential_nonce: row.get(6)?,
        created_at: parse_datetime(row.get(7)?),
        updated_at: parse_datetime(row.get(8)?),
    })
}

/// Insert or replace the configuration for `(owner, destination)`.
pub fn upsert_destination_config(
    conn: &Connection,
    config: &NewDestinationConfig,
) -> DatabaseResult<DestinationConfig> {
    let now = format_datetime(&Utc::now());
    conn.execute(
        "INSERT INTO destination_configs (
            owner_id, destination, enabled, todo_only, supports_todos,
            credential_ciphertext, credential_nonce, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT (owner_id, destination) DO UPDATE SET
            enabled = excluded.enabled,
            todo_only = excluded.todo_only,
            supports_todos = excluded.supports_todos,
            credential_ciphertext = excluded.credential_ciphertext,
            credential_nonce = excluded.credential_nonce,
            updated_at = excluded.updated_at",
        params![
            config.owner_id,
            config.destination,
            config.enabled,
            config.todo_only,
            config.supports_todos,
            config.credential_ciphertext,
            config.credential_nonce,
            now,
        ],
    )?;

    get_destination_config(conn, &config.owner_id, &config.destination)?.ok_or_else(|| {
        DatabaseError::NotFound("Destination config not found after upsert".to_string())
    })
}

pub fn get_destination_config(
    conn: &Connection,
    owner_id: &str,
    destination: &str,
) -> DatabaseResult<Option<DestinationConfig>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {CONFIG_COLUMNS} FROM destination_configs
         WHERE owner_id = ?1 AND destination = ?2"
    ))?;

    match stmt.query_row(params![owner_id, destination], map_config) {
        Ok(config) => Ok(Some(config)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All of an owner's configurations, enabled or not, by destination name.
pub fn list_destination_configs(
    conn: &Connection,
    owner_id: &str,
) -> DatabaseResult<Vec<DestinationConfig>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {CONFIG_COLUMNS} FROM destination_configs
         WHERE owner_id = ?1
         ORDER BY destination ASC"
    ))?;

    let configs = stmt
        .query_map(params![owner_id], map_config)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(configs)
}

pub fn list_enabled_destination_configs(
    conn: &Connection,
    owner_id: &str,
) -> DatabaseResult<Vec<DestinationConfig>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {CONFIG_COLUMNS} FROM destination_configs
         WHERE owner_id = ?1 AND enabled = 1
         ORDER BY destination ASC"
    ))?;

    let configs = stmt
        .query_map(params![owner_id], map_config)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(configs)
}

/// Delete a configuration.
pub fn delete_destination_config(
    conn: &Connection,
    owner_id: &str,
    destination: &str,
) -> DatabaseResult<bool> {
    let count = conn.execute(
        "DELETE FROM destination_configs WHERE owner_id = ?1 AND destination = ?2",
        params![owner_id, destination],
    )?;
    Ok(count > 0)
}
