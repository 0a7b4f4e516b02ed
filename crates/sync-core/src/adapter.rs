//! The destination adapter seam.

use crate::{AdapterResult, SyncItem, SyncResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result metadata key carrying the destination container id.
pub const METADATA_CONTAINER_ID: &str = "container_id";

/// Result metadata key set to `true` when the adapter created a new container.
pub const METADATA_CONTAINER_CREATED: &str = "container_created";

/// Connectivity and capability self-report of a destination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub name: String,
    pub connected: bool,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// A concrete external destination.
///
/// Every method may perform network I/O. Destination identifiers are opaque
/// to the engine and only ever handed back to the adapter that produced
/// them. Whether `sync_item` creates or updates is the adapter's decision;
/// the engine passes `existing_destination_id` / `existing_container_id` on
/// the item when it knows them.
#[async_trait]
pub trait DestinationAdapter: Send + Sync {
    async fn sync_item(&self, item: &SyncItem) -> AdapterResult<SyncResult>;

    /// Adapter-side duplicate lookup. Not authoritative.
    async fn check_duplicate(&self, content_hash: &str) -> AdapterResult<Option<String>>;

    async fn update_item(&self, destination_id: &str, item: &SyncItem)
        -> AdapterResult<SyncResult>;

    /// Delete or archive a previously delivered object.
    async fn delete_item(&self, destination_id: &str) -> AdapterResult<SyncResult>;

    async fn get_target_info(&self) -> AdapterResult<TargetInfo>;

    async fn validate_connection(&self) -> bool {
        match self.get_target_info().await {
            Ok(info) => info.connected,
            Err(_) => false,
        }
    }
}
