//! Admission layer for the durable sync queue.
//!
//! This crate provides:
//! - SyncQueue: decides whether new delivery work is needed and persists it
//! - QueueRequest: one (item, destination) pair a producer wants delivered
//! - Typed enqueue helpers for pages, todos, highlights and notebook backfill

mod error;
mod queue;
mod request;

#[cfg(test)]
mod tests;

pub use error::{QueueError, QueueResult};
pub use queue::SyncQueue;
pub use request::{
    Admission, Admitted, QueueRequest, DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY,
    PRIORITY_BACKFILL, PRIORITY_HIGHLIGHT, PRIORITY_PAGE, PRIORITY_TODO,
};
