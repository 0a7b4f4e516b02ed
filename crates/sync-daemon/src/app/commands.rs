//! One-shot commands.

use super::state::DaemonState;
use anyhow::{bail, Context};
use sync_config_and_utils::{Config, Paths};
use sync_database::{queries, NewDestinationConfig};
use sync_queue::SyncQueue;
use tracing::info;

/// Values for `configure-destination`.
pub struct DestinationSettings {
    pub owner: String,
    pub destination: String,
    pub enabled: bool,
    pub todo_only: bool,
    pub supports_todos: bool,
    pub credentials: Option<String>,
}

/// Deliver an owner's notebooks to one destination now, or queue their
/// pages for the worker when `queue` is set.
pub async fn backfill(
    config: Config,
    paths: Paths,
    owner: &str,
    destination: &str,
    queue: bool,
) -> anyhow::Result<()> {
    let state = DaemonState::init(config, &paths).await?;

    if queue {
        let sync_queue = SyncQueue::new(state.db.clone());
        let owner_id = owner.to_string();
        let notebooks = state
            .db
            .call(move |conn| queries::list_notebooks(conn, &owner_id))
            .await?;

        let mut queued = 0;
        for notebook in &notebooks {
            let rows = sync_queue.queue_notebook_backfill(owner, &notebook.id).await?;
            queued += rows
                .iter()
                .filter(|row| row.destination == destination && row.status.is_active())
                .count();
        }
        println!(
            "Queued {} page(s) from {} notebook(s) for {}",
            queued,
            notebooks.len(),
            destination
        );
        return Ok(());
    }

    let report = state
        .manager()
        .backfill_destination(owner, destination)
        .await
        .with_context(|| format!("backfill to {} failed", destination))?;
    println!(
        "Backfill to {}: {} considered, {} delivered, {} skipped, {} failed",
        destination, report.considered, report.delivered, report.skipped, report.failed
    );
    Ok(())
}

pub async fn queue_page(config: Config, paths: Paths, owner: &str, page: &str) -> anyhow::Result<()> {
    let state = DaemonState::init(config, &paths).await?;
    let rows = SyncQueue::new(state.db.clone())
        .queue_page_sync(owner, page)
        .await?;

    if rows.is_empty() {
        println!("No enabled destination accepts pages for {}", owner);
    }
    for row in rows {
        println!(
            "row {} -> {} [{}]",
            row.id,
            row.destination,
            row.status.as_str()
        );
    }
    Ok(())
}

pub async fn cancel_row(config: Config, paths: Paths, row: i64) -> anyhow::Result<()> {
    let state = DaemonState::init(config, &paths).await?;
    if SyncQueue::new(state.db.clone()).cancel(row).await? {
        println!("Cancelled row {}", row);
    } else {
        println!("Row {} is not pending; left unchanged", row);
    }
    Ok(())
}

pub async fn show_status(config: Config, paths: Paths, owner: Option<&str>) -> anyhow::Result<()> {
    let state = DaemonState::init(config, &paths).await?;
    let stats = SyncQueue::new(state.db.clone()).stats(owner).await?;
    let owner_id = owner.map(str::to_string);
    let records = state
        .db
        .call(move |conn| queries::count_records_by_status(conn, owner_id.as_deref()))
        .await?;

    println!("Database: {}", state.db.path());
    println!("Destinations: {}", state.registry.names().join(", "));
    println!(
        "Queue: {} pending, {} processing, {} completed, {} failed, {} cancelled",
        stats.pending, stats.processing, stats.completed, stats.failed, stats.cancelled
    );
    if records.is_empty() {
        println!("Records: none");
    }
    for (status, count) in records {
        println!("Records {}: {}", status, count);
    }
    Ok(())
}

pub async fn configure_destination(
    config: Config,
    paths: Paths,
    settings: DestinationSettings,
) -> anyhow::Result<()> {
    let state = DaemonState::init(config, &paths).await?;

    let mut new_config = NewDestinationConfig::new(&settings.owner, &settings.destination);
    new_config.enabled = settings.enabled;
    new_config.todo_only = settings.todo_only;
    new_config.supports_todos = settings.supports_todos || settings.todo_only;

    if let Some(secret) = settings.credentials.as_deref() {
        let Some(key) = state.credential_key else {
            bail!("credentials given but no credential_key is configured (set SYNCD_CREDENTIAL_KEY)");
        };
        new_config = new_config.with_credentials(&key, secret)?;
    }

    let stored = state
        .db
        .call(move |conn| queries::upsert_destination_config(conn, &new_config))
        .await?;

    info!(
        owner_id = %stored.owner_id,
        destination = %stored.destination,
        enabled = stored.enabled,
        "Destination configured"
    );
    println!(
        "{} / {}: enabled={} todo_only={} supports_todos={} credentials={}",
        stored.owner_id,
        stored.destination,
        stored.enabled,
        stored.todo_only,
        stored.supports_todos,
        stored.has_credentials()
    );
    Ok(())
}
