//! Queue error types.

use thiserror::Error;

/// Queue error type.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sync_database::DatabaseError),

    /// Priority outside 1..=10
    #[error("Invalid priority {0}: must be between 1 and 10")]
    InvalidPriority(i32),

    /// Request is missing a required field
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Referenced content is not in storage
    #[error("Content not found: {0}")]
    ContentNotFound(String),

    /// Queue row not found
    #[error("Queue row not found: {0}")]
    RowNotFound(i64),
}

/// Result type alias using QueueError.
pub type QueueResult<T> = Result<T, QueueError>;
