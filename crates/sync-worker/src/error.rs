//! Error types for the sync worker.

use sync_core::ItemKind;
use sync_database::DatabaseError;
use thiserror::Error;

/// Why a claimed row (or a whole tick) failed.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// No usable destination configuration or adapter. Never transient.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The background path only dispatches page text.
    #[error("unsupported item kind: {0}")]
    UnsupportedItemKind(ItemKind),

    /// The stored content the row refers to is gone.
    #[error("Content not found: {0}")]
    ContentNotFound(String),

    /// The adapter returned an error or reported a failed delivery.
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// The adapter panicked while delivering.
    #[error("Adapter panicked: {0}")]
    AdapterPanic(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias using WorkerError.
pub type WorkerResult<T> = Result<T, WorkerError>;
