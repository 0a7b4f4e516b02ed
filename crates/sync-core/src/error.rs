//! Error types for adapters and fingerprinting.

use crate::ItemKind;
use thiserror::Error;

/// Error raised by a destination adapter.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The destination could not be reached.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The destination answered but refused the request.
    #[error("Destination rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The item payload cannot be represented at the destination.
    #[error("Invalid item: {0}")]
    InvalidItem(String),

    /// Credentials were missing or not accepted.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Payload (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using AdapterError.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Error computing a fingerprint from an item payload.
#[derive(Error, Debug)]
pub enum FingerprintError {
    /// The payload does not carry the fields tracked for this kind.
    #[error("Payload is not a valid {kind} item: {source}")]
    InvalidPayload {
        kind: ItemKind,
        #[source]
        source: serde_json::Error,
    },
}
