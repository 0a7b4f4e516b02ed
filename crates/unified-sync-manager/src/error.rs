//! Error types for the unified sync manager.

use sync_core::FingerprintError;
use sync_database::DatabaseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManagerError {
    /// No adapter is registered under this destination name.
    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using ManagerError.
pub type ManagerResult<T> = Result<T, ManagerError>;
