//! Synchronous sync path.
//!
//! [`UnifiedSyncManager`] delivers items to destinations "now", without the
//! queue, while sharing the fingerprints, per-kind record identities and
//! record store the background worker uses. It serves kinds the worker does
//! not dispatch (todos, highlights, notebooks) and bulk backfill.

mod error;
mod manager;

#[cfg(test)]
mod tests;

pub use error::{ManagerError, ManagerResult};
pub use manager::{BackfillReport, TargetOutcome, UnifiedSyncManager};
