use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Owner's handle on a running worker loop.
///
/// Dropping the handle without calling [`stop`](Self::stop) also ends the
/// loop at its next tick, since the shutdown sender is dropped with it.
pub struct WorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn new(shutdown: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            shutdown: Some(shutdown),
            task,
        }
    }

    /// Signal the loop and wait for it to exit.
    ///
    /// A batch in flight is finished first; nothing is aborted mid-row.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The loop may already be gone; then there is nobody to tell.
            let _ = shutdown.send(());
        }

        match (&mut self.task).await {
            Ok(()) => info!("Sync worker task joined"),
            Err(e) if e.is_panic() => warn!(error = %e, "Sync worker task panicked"),
            Err(e) => warn!(error = %e, "Sync worker task ended abnormally"),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
