//! Long-running worker process.

use super::state::DaemonState;
use std::sync::Arc;
use sync_config_and_utils::{Config, Paths};
use sync_worker::SyncWorker;
use tracing::{info, warn};

/// Run the sync worker until Ctrl-C, then stop it gracefully.
pub async fn run_daemon(config: Config, paths: Paths) -> anyhow::Result<()> {
    let state = DaemonState::init(config, &paths).await?;
    state.db.health_check().await?;

    if state.registry.is_empty() {
        warn!("No destinations configured; claimed rows will fail until one is added");
    }

    let worker = Arc::new(SyncWorker::new(
        state.db.clone(),
        state.registry.clone(),
        state.worker_config(),
    ));
    let handle = worker.start();

    info!(
        database = %state.db.path(),
        destinations = ?state.registry.names(),
        "syncd running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, stopping worker...");

    handle.stop().await;
    state.db.close().await?;
    info!("syncd stopped");
    Ok(())
}
