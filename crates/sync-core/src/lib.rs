//! Core types for the sync dispatch engine.
//!
//! This crate provides:
//! - Content fingerprints: the sole "did this change" signal
//! - [`SyncItem`] / [`SyncResult`]: the values carried between components
//! - [`DestinationAdapter`]: the pluggable destination seam
//! - [`AdapterRegistry`]: the name-keyed adapter lookup shared by the
//!   worker and the unified manager
//! - [`RecordIdentity`]: the per-kind dedup key strategy

mod adapter;
mod content;
mod error;
pub mod fingerprint;
mod identity;
mod item;
mod registry;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use adapter::{DestinationAdapter, TargetInfo, METADATA_CONTAINER_CREATED, METADATA_CONTAINER_ID};
pub use content::{HighlightContent, NotebookContent, PageContent, TodoContent};
pub use error::{AdapterError, AdapterResult, FingerprintError};
pub use fingerprint::{
    fingerprint_highlight, fingerprint_item, fingerprint_notebook, fingerprint_notebook_metadata,
    fingerprint_page, fingerprint_todo, fingerprint_value, NOTEBOOK_TEXT_PREFIX_CHARS,
};
pub use identity::RecordIdentity;
pub use item::{Credentials, ItemKind, SyncItem, SyncResult, SyncStatus};
pub use registry::AdapterRegistry;
