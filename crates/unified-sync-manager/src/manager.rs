//! Unified sync manager for direct and fan-out delivery.

use crate::{ManagerError, ManagerResult};
use futures_util::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use sync_core::{
    fingerprint_item, fingerprint_notebook, AdapterRegistry, Credentials, DestinationAdapter,
    ItemKind, RecordIdentity, SyncItem, SyncResult, SyncStatus,
};
use sync_database::{queries, AsyncDatabase, RecordUpsert, SyncRecord};
use tracing::{debug, info, warn};

/// One destination's answer in a fan-out.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub destination: String,
    pub result: SyncResult,
}

/// Counts from one destination backfill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Notebooks that still needed delivery when the backfill started.
    pub considered: usize,
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Delivers items to registered destinations synchronously.
///
/// The adapter registry is shared with whoever constructed it, so adapters
/// registered through the manager are also visible to a worker built from
/// the same registry.
pub struct UnifiedSyncManager {
    db: AsyncDatabase,
    registry: AdapterRegistry,
    credential_key: Option<[u8; 32]>,
}

impl UnifiedSyncManager {
    pub fn new(db: AsyncDatabase, registry: AdapterRegistry) -> Self {
        Self {
            db,
            registry,
            credential_key: None,
        }
    }

    /// Key used to unseal credentials stored in destination configuration
    /// for items that arrive without credentials.
    pub fn with_credential_key(mut self, key: [u8; 32]) -> Self {
        self.credential_key = Some(key);
        self
    }

    pub fn database(&self) -> &AsyncDatabase {
        &self.db
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn register_target(&self, name: impl Into<String>, adapter: Arc<dyn DestinationAdapter>) {
        let name = name.into();
        if self.registry.register(name.clone(), adapter).is_some() {
            info!(destination = %name, "Replaced sync target");
        } else {
            info!(destination = %name, "Registered sync target");
        }
    }

    pub fn unregister_target(&self, name: &str) -> bool {
        let removed = self.registry.unregister(name).is_some();
        if removed {
            info!(destination = %name, "Unregistered sync target");
        }
        removed
    }

    pub fn get_target(&self, name: &str) -> Option<Arc<dyn DestinationAdapter>> {
        self.registry.get(name)
    }

    pub fn target_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Deliver one item to one destination.
    ///
    /// A missing `content_hash` is computed from the payload. Content already
    /// delivered to this destination comes back `Skipped` without contacting
    /// the adapter. Otherwise the adapter is called with any previously
    /// delivered destination and container ids, and the outcome is recorded
    /// whatever it was. Adapter errors and panics become `Failed` results.
    pub async fn sync_item_to_target(
        &self,
        item: &SyncItem,
        destination: &str,
    ) -> ManagerResult<SyncResult> {
        let adapter = self
            .registry
            .get(destination)
            .ok_or_else(|| ManagerError::UnknownTarget(destination.to_string()))?;

        let content_hash = match &item.content_hash {
            Some(hash) => hash.clone(),
            None => fingerprint_item(item.item_kind, &item.data)?,
        };
        let identity =
            RecordIdentity::resolve(item.item_kind, item.page_identity.as_deref(), &content_hash);
        // Notebook records are keyed by content hash, so an edited notebook
        // finds its destination object through its newest notebook record.
        let notebook_level = matches!(
            item.item_kind,
            ItemKind::Notebook | ItemKind::NotebookMetadata
        );

        let (record, collection_record, config) = {
            let owner = item.owner_id.clone();
            let target = destination.to_string();
            let identity = identity.clone();
            let collection = if notebook_level {
                Some(item.item_id.clone())
            } else {
                item.collection_identity.clone()
            };
            self.db
                .call(move |conn| {
                    let record = queries::find_record(conn, &owner, &target, &identity)?;
                    let collection_record = match collection {
                        Some(collection) => {
                            queries::find_collection_record(conn, &owner, &target, &collection)?
                        }
                        None => None,
                    };
                    let config = queries::get_destination_config(conn, &owner, &target)?;
                    Ok((record, collection_record, config))
                })
                .await?
        };

        if let Some(record) = record.as_ref().filter(|r| r.delivered(&content_hash)) {
            debug!(
                destination,
                item_kind = %item.item_kind,
                item_id = %item.item_id,
                "Content already delivered, skipping"
            );
            let mut skipped = SyncResult::skipped("content already delivered");
            skipped.destination_id = record.destination_id.clone();
            return Ok(skipped);
        }

        let mut outgoing = item.clone().with_content_hash(&content_hash);
        let collection_destination_id = collection_record
            .as_ref()
            .and_then(|r| r.destination_id.clone());
        if outgoing.existing_destination_id.is_none() {
            outgoing.existing_destination_id =
                record.as_ref().and_then(|r| r.destination_id.clone());
        }
        if notebook_level {
            if outgoing.existing_destination_id.is_none() {
                outgoing.existing_destination_id = collection_destination_id;
            }
        } else if outgoing.existing_container_id.is_none() {
            outgoing.existing_container_id = collection_destination_id;
        }
        if outgoing.credentials.is_none() {
            if let Some(config) = config.filter(|config| config.has_credentials()) {
                match config.resolve_credentials(self.credential_key.as_ref()) {
                    Ok(secret) => outgoing.credentials = secret.map(Credentials::new),
                    Err(e) => warn!(
                        destination,
                        error = %e,
                        "Cannot resolve stored credentials, sending without them"
                    ),
                }
            }
        }

        let result = deliver(adapter.as_ref(), &outgoing).await;
        if !result.is_success() && result.status != SyncStatus::Skipped {
            warn!(
                destination,
                item_kind = %item.item_kind,
                item_id = %item.item_id,
                status = result.status.as_str(),
                error = result.error_message.as_deref().unwrap_or(""),
                "Sync to target did not succeed"
            );
        }

        let upsert = record_for(&outgoing, &content_hash, destination, &result);
        let stored: SyncRecord = self
            .db
            .call(move |conn| queries::upsert_record(conn, &upsert))
            .await?;
        debug!(
            destination,
            record_id = stored.id,
            status = stored.status.as_str(),
            "Recorded sync outcome"
        );

        Ok(result)
    }

    /// Deliver one item to every registered destination not in `exclude`.
    ///
    /// Destinations are visited one after another in name order. Each gets
    /// its own result; an error on one becomes that destination's `Failed`
    /// result and the rest still run.
    pub async fn sync_item_to_all_targets(
        &self,
        item: &SyncItem,
        exclude: &[&str],
    ) -> Vec<TargetOutcome> {
        let mut outcomes = Vec::new();
        for destination in self.registry.names() {
            if exclude.contains(&destination.as_str()) {
                continue;
            }
            let result = match self.sync_item_to_target(item, &destination).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(destination = %destination, error = %e, "Sync to target failed");
                    SyncResult::failed(e.to_string())
                }
            };
            outcomes.push(TargetOutcome {
                destination,
                result,
            });
        }
        outcomes
    }

    /// One notebook-level item per stored notebook of `owner_id`, its pages'
    /// text concatenated, with the notebook fingerprint as content hash.
    pub async fn get_all_notebooks_for_sync(&self, owner_id: &str) -> ManagerResult<Vec<SyncItem>> {
        let owner = owner_id.to_string();
        let notebooks = self
            .db
            .call(move |conn| {
                let mut notebooks = Vec::new();
                for notebook in queries::list_notebooks(conn, &owner)? {
                    let pages = queries::list_pages_for_notebook(conn, &notebook.id)?;
                    notebooks.push((notebook, pages));
                }
                Ok(notebooks)
            })
            .await?;

        let mut items = Vec::with_capacity(notebooks.len());
        for (notebook, pages) in notebooks {
            let content = notebook.content(&pages);
            let hash = fingerprint_notebook(&content);
            let mut item = SyncItem::new(
                owner_id,
                ItemKind::Notebook,
                &notebook.id,
                serde_json::to_value(&content)?,
            )
            .with_content_hash(hash);
            item.created_at = notebook.created_at;
            item.updated_at = notebook.updated_at;
            items.push(item);
        }
        Ok(items)
    }

    /// Notebooks whose current fingerprint has not been delivered to
    /// `destination`.
    pub async fn get_notebooks_needing_sync(
        &self,
        owner_id: &str,
        destination: &str,
    ) -> ManagerResult<Vec<SyncItem>> {
        let items = self.get_all_notebooks_for_sync(owner_id).await?;

        let owner = owner_id.to_string();
        let target = destination.to_string();
        let pending = self
            .db
            .call(move |conn| {
                let mut pending = Vec::new();
                for item in items {
                    let hash = item.content_hash.clone().unwrap_or_default();
                    let record = queries::find_record(
                        conn,
                        &owner,
                        &target,
                        &RecordIdentity::Content(hash.clone()),
                    )?;
                    if !record.is_some_and(|record| record.delivered(&hash)) {
                        pending.push(item);
                    }
                }
                Ok(pending)
            })
            .await?;
        Ok(pending)
    }

    /// Deliver every notebook that still needs it to one destination.
    pub async fn backfill_destination(
        &self,
        owner_id: &str,
        destination: &str,
    ) -> ManagerResult<BackfillReport> {
        if self.registry.get(destination).is_none() {
            return Err(ManagerError::UnknownTarget(destination.to_string()));
        }

        let items = self.get_notebooks_needing_sync(owner_id, destination).await?;
        let mut report = BackfillReport {
            considered: items.len(),
            ..BackfillReport::default()
        };

        for item in &items {
            let result = self.sync_item_to_target(item, destination).await?;
            match result.status {
                SyncStatus::Success => report.delivered += 1,
                SyncStatus::Skipped => report.skipped += 1,
                SyncStatus::Failed | SyncStatus::Retry => report.failed += 1,
            }
        }

        info!(
            owner_id,
            destination,
            considered = report.considered,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Backfill finished"
        );
        Ok(report)
    }
}

async fn deliver(adapter: &dyn DestinationAdapter, item: &SyncItem) -> SyncResult {
    match AssertUnwindSafe(adapter.sync_item(item)).catch_unwind().await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => SyncResult::failed(e.to_string()),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            SyncResult::failed(format!("adapter panicked: {}", message))
        }
    }
}

fn record_for(
    item: &SyncItem,
    content_hash: &str,
    destination: &str,
    result: &SyncResult,
) -> RecordUpsert {
    RecordUpsert {
        owner_id: item.owner_id.clone(),
        item_kind: item.item_kind,
        item_id: item.item_id.clone(),
        content_hash: content_hash.to_string(),
        destination: destination.to_string(),
        destination_id: result
            .destination_id
            .clone()
            .or_else(|| item.existing_destination_id.clone()),
        status: result.status,
        page_identity: item.page_identity.clone(),
        collection_identity: item.collection_identity.clone(),
        sequence_number: item.sequence_number,
        metadata: json!({ "source_table": item.source_table }),
        error_message: result.error_message.clone(),
    }
}
