//! # Sync worker
//!
//! Background dispatcher for the durable sync queue. Each tick it atomically
//! claims a batch of due rows, resolves the destination configuration,
//! adapter and prior delivery state for each, and drives every row to
//! `completed` or `failed`.
//!
//! ```text
//! ┌────────────┐  claim   ┌────────────┐  sync_item  ┌─────────────┐
//! │ sync_queue │─────────▶│ SyncWorker │────────────▶│   adapter   │
//! └────────────┘          └─────┬──────┘             └─────────────┘
//!                               │ upsert
//!                        ┌──────▼───────┐
//!                        │ sync_records │
//!                        └──────────────┘
//! ```
//!
//! Only page text is delivered on this path. Other kinds fail with
//! `unsupported item kind` and go through the unified manager instead.
//!
//! Failed rows stay failed. `attempt_count` is bookkeeping, and a
//! `Retry` result from an adapter is recorded as a failure.
//!
//! ```ignore
//! let worker = Arc::new(SyncWorker::new(db, registry, SyncWorkerConfig::default()));
//! let handle = worker.start();
//! // ...
//! handle.stop().await;
//! ```

mod config;
mod error;
mod handle;
mod worker;

#[cfg(test)]
mod tests;

pub use config::SyncWorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use handle::WorkerHandle;
pub use worker::{SyncWorker, TickReport};
