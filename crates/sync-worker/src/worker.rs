//! Claim-and-deliver loop body.

use crate::{SyncWorkerConfig, WorkerError, WorkerHandle, WorkerResult};
use chrono::Utc;
use futures_util::FutureExt;
use rusqlite::TransactionBehavior;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use sync_core::{
    fingerprint_notebook, AdapterRegistry, Credentials, DestinationAdapter, ItemKind,
    RecordIdentity, SyncItem, SyncResult, SyncStatus,
};
use sync_database::{
    queries, AsyncDatabase, DestinationConfig, Page, QueueCompletion, RecordUpsert, SyncQueueRow,
    SyncRecord,
};
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Counts for one claimed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub claimed: usize,
    /// Rows delivered through an adapter.
    pub delivered: usize,
    /// Rows completed without calling the adapter because the content was
    /// already delivered.
    pub unchanged: usize,
    pub failed: usize,
}

/// How a row that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Delivered,
    Skipped,
    Unchanged,
}

impl RowOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Skipped => "skipped",
            Self::Unchanged => "unchanged",
        }
    }
}

/// A failed row, with what must be written alongside the failure.
struct RowFailure {
    error: WorkerError,
    /// Whether the adapter was contacted.
    attempted: bool,
    /// Failed record to upsert, only when delivery was attempted.
    record: Option<RecordUpsert>,
}

impl RowFailure {
    fn before_delivery(error: WorkerError) -> Self {
        Self {
            error,
            attempted: false,
            record: None,
        }
    }
}

impl From<sync_database::DatabaseError> for RowFailure {
    fn from(e: sync_database::DatabaseError) -> Self {
        Self::before_delivery(WorkerError::Database(e))
    }
}

/// Everything read from storage before a page row is delivered.
struct PageContext {
    page: Page,
    collection_record: Option<SyncRecord>,
    page_record: Option<SyncRecord>,
}

/// Background dispatcher for the sync queue.
///
/// Each tick claims up to `batch_size` due rows (flipping them to
/// `processing` in a committed transaction), then processes them one at a
/// time. Every claimed row ends the tick as `completed` or `failed`; a row's
/// error or adapter panic never aborts the rest of the batch.
///
/// Several workers, in this process or others, may share one database file.
/// The claim is the only coordination between them.
pub struct SyncWorker {
    db: AsyncDatabase,
    registry: AdapterRegistry,
    config: SyncWorkerConfig,
}

impl SyncWorker {
    pub fn new(db: AsyncDatabase, registry: AdapterRegistry, config: SyncWorkerConfig) -> Self {
        Self {
            db,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &SyncWorkerConfig {
        &self.config
    }

    /// Spawn the poll loop and return its handle.
    ///
    /// The first tick runs immediately. A stop request is observed between
    /// batches, so rows already claimed are finished before the loop exits.
    pub fn start(self: Arc<Self>) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let worker = self;

        let task = tokio::spawn(async move {
            let mut ticker = interval(worker.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                poll_interval_ms = worker.config.poll_interval.as_millis() as u64,
                batch_size = worker.config.batch_size,
                "Sync worker started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => {
                        info!("Sync worker received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                match worker.run_once().await {
                    Ok(report) if report.claimed > 0 => {
                        info!(
                            claimed = report.claimed,
                            delivered = report.delivered,
                            unchanged = report.unchanged,
                            failed = report.failed,
                            "Sync worker tick finished"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Sync worker failed to claim due rows");
                    }
                }
            }

            info!("Sync worker stopped");
        });

        WorkerHandle::new(shutdown_tx, task)
    }

    /// Claim one batch of due rows and drive each to a terminal state.
    ///
    /// Only the claim itself can fail the tick; per-row problems are
    /// recorded on the row.
    pub async fn run_once(&self) -> WorkerResult<TickReport> {
        let limit = self.config.batch_size;
        let rows = self
            .db
            .call(move |conn| queries::claim_due_batch(conn, limit, Utc::now()))
            .await?;
        let claimed_at = Instant::now();

        let mut report = TickReport {
            claimed: rows.len(),
            ..TickReport::default()
        };
        if rows.is_empty() {
            return Ok(report);
        }
        debug!(claimed = rows.len(), "Claimed sync queue rows");

        for row in rows {
            match self.process_claimed(&row, claimed_at).await {
                Some(RowOutcome::Unchanged) => report.unchanged += 1,
                Some(RowOutcome::Delivered | RowOutcome::Skipped) => report.delivered += 1,
                None => report.failed += 1,
            }
        }

        Ok(report)
    }

    /// Process one claimed row and log exactly one terminal event for it.
    /// Returns `None` when the row failed.
    async fn process_claimed(
        &self,
        row: &SyncQueueRow,
        claimed_at: Instant,
    ) -> Option<RowOutcome> {
        info!(
            event = "sync_row_started",
            row_id = row.id,
            destination = %row.destination,
            item_kind = %row.item_kind,
            "Processing sync row"
        );

        match self.process_row(row).await {
            Ok(outcome) => {
                info!(
                    event = "sync_row_completed",
                    row_id = row.id,
                    destination = %row.destination,
                    item_kind = %row.item_kind,
                    outcome = outcome.as_str(),
                    elapsed_ms = claimed_at.elapsed().as_millis() as u64,
                    "Sync row completed"
                );
                Some(outcome)
            }
            Err(failure) => {
                self.record_failure(row, &failure).await;
                warn!(
                    event = "sync_row_failed",
                    row_id = row.id,
                    destination = %row.destination,
                    item_kind = %row.item_kind,
                    attempted = failure.attempted,
                    error = %failure.error,
                    elapsed_ms = claimed_at.elapsed().as_millis() as u64,
                    "Sync row failed"
                );
                None
            }
        }
    }

    async fn process_row(&self, row: &SyncQueueRow) -> Result<RowOutcome, RowFailure> {
        let config = self.resolve_config(row).await?;

        let adapter = self.registry.get(&row.destination).ok_or_else(|| {
            RowFailure::before_delivery(WorkerError::Configuration(format!(
                "no adapter registered for destination {}",
                row.destination
            )))
        })?;

        let credentials = config
            .resolve_credentials(self.config.credential_key.as_ref())
            .map_err(|e| {
                RowFailure::before_delivery(WorkerError::Configuration(format!(
                    "cannot resolve credentials for {}: {}",
                    row.destination, e
                )))
            })?
            .map(Credentials::new);

        match row.item_kind {
            ItemKind::PageText => self.process_page(row, adapter, credentials).await,
            other => Err(RowFailure::before_delivery(
                WorkerError::UnsupportedItemKind(other),
            )),
        }
    }

    async fn resolve_config(&self, row: &SyncQueueRow) -> Result<DestinationConfig, RowFailure> {
        let owner = row.owner_id.clone();
        let destination = row.destination.clone();
        let config = self
            .db
            .call(move |conn| queries::get_destination_config(conn, &owner, &destination))
            .await?;

        match config {
            Some(config) if config.is_enabled() => Ok(config),
            Some(_) => Err(RowFailure::before_delivery(WorkerError::Configuration(
                format!("destination {} is disabled", row.destination),
            ))),
            None => Err(RowFailure::before_delivery(WorkerError::Configuration(
                format!("no destination configuration for {}", row.destination),
            ))),
        }
    }

    async fn process_page(
        &self,
        row: &SyncQueueRow,
        adapter: Arc<dyn DestinationAdapter>,
        credentials: Option<Credentials>,
    ) -> Result<RowOutcome, RowFailure> {
        let context = self.load_page_context(row).await?;

        if context
            .page_record
            .as_ref()
            .is_some_and(|record| record.delivered(&row.content_hash))
        {
            let id = row.id;
            let hash = row.content_hash.clone();
            let completion = self
                .db
                .call(move |conn| {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                    let completion = queries::complete_queue_row(&tx, id, &hash, false)?;
                    tx.commit()?;
                    Ok(completion)
                })
                .await?;
            log_completion(row, &completion);
            return Ok(RowOutcome::Unchanged);
        }

        let existing_destination_id = context
            .page_record
            .as_ref()
            .and_then(|record| record.destination_id.clone());
        let existing_container_id = context
            .collection_record
            .as_ref()
            .and_then(|record| record.destination_id.clone());

        let page = &context.page;
        let mut item = SyncItem::new(
            &row.owner_id,
            ItemKind::PageText,
            &row.item_id,
            json!({
                "collection_identity": page.notebook_id,
                "sequence_number": page.page_number,
                "text": page.text,
            }),
        )
        .with_content_hash(&row.content_hash)
        .with_page(&page.id, &page.notebook_id, page.page_number)
        .with_existing_ids(existing_destination_id, existing_container_id);
        item.created_at = page.created_at;
        item.updated_at = page.updated_at;
        item.credentials = credentials;

        let result = deliver(adapter.as_ref(), &item).await.map_err(|error| RowFailure {
            record: Some(page_record(row, page, None, SyncStatus::Failed, Some(error.to_string()))),
            error,
            attempted: true,
        })?;

        match result.status {
            SyncStatus::Success | SyncStatus::Skipped => {
                let outcome = if result.is_success() {
                    RowOutcome::Delivered
                } else {
                    RowOutcome::Skipped
                };
                self.finish_delivery(row, &context, result).await?;
                Ok(outcome)
            }
            // Retry is recorded like a failure; nothing re-admits the row.
            SyncStatus::Failed | SyncStatus::Retry => {
                let message = result
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("destination reported {}", result.status.as_str()));
                Err(RowFailure {
                    error: WorkerError::Adapter(message.clone()),
                    attempted: true,
                    record: Some(page_record(
                        row,
                        page,
                        result.destination_id.clone(),
                        result.status,
                        Some(message),
                    )),
                })
            }
        }
    }

    async fn load_page_context(&self, row: &SyncQueueRow) -> Result<PageContext, RowFailure> {
        let page_id = row
            .page_identity
            .clone()
            .unwrap_or_else(|| row.item_id.clone());
        let owner = row.owner_id.clone();
        let destination = row.destination.clone();

        let (page, collection_record, page_record) = self
            .db
            .call(move |conn| {
                let page = queries::get_page(conn, &page_id)?;
                let Some(page) = page else {
                    return Ok((None, None, None));
                };
                let collection =
                    queries::find_collection_record(conn, &owner, &destination, &page.notebook_id)?;
                let record = queries::find_record(
                    conn,
                    &owner,
                    &destination,
                    &RecordIdentity::Page(page.id.clone()),
                )?;
                Ok((Some(page), collection, record))
            })
            .await?;

        let page = page
            .filter(|page| page.owner_id == row.owner_id)
            .ok_or_else(|| {
                RowFailure::before_delivery(WorkerError::ContentNotFound(format!(
                    "page {}",
                    row.page_identity.as_deref().unwrap_or(&row.item_id)
                )))
            })?;

        Ok(PageContext {
            page,
            collection_record,
            page_record,
        })
    }

    /// Record a delivered page and complete its row in one transaction.
    async fn finish_delivery(
        &self,
        row: &SyncQueueRow,
        context: &PageContext,
        result: SyncResult,
    ) -> Result<(), RowFailure> {
        let record = page_record(
            row,
            &context.page,
            result.destination_id.clone(),
            result.status,
            None,
        );
        let container = (result.container_created() && context.collection_record.is_none())
            .then(|| ContainerWrite {
                owner_id: row.owner_id.clone(),
                destination: row.destination.clone(),
                notebook_id: context.page.notebook_id.clone(),
                destination_id: result.container_id().map(str::to_string),
            });
        let id = row.id;
        let hash = row.content_hash.clone();

        let completion = self
            .db
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                queries::upsert_record(&tx, &record)?;
                if let Some(container) = container {
                    container.write(&tx)?;
                }
                let completion = queries::complete_queue_row(&tx, id, &hash, true)?;
                tx.commit()?;
                Ok(completion)
            })
            .await
            .map_err(|e| RowFailure {
                error: WorkerError::Database(e),
                attempted: true,
                record: None,
            })?;

        log_completion(row, &completion);
        Ok(())
    }

    async fn record_failure(&self, row: &SyncQueueRow, failure: &RowFailure) {
        let id = row.id;
        let message = failure.error.to_string();
        let attempted = failure.attempted;
        let record = failure.record.clone();

        let result = self
            .db
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                if let Some(record) = record {
                    queries::upsert_record(&tx, &record)?;
                }
                let failed = queries::fail_queue_row(&tx, id, &message, attempted)?;
                tx.commit()?;
                Ok(failed)
            })
            .await;

        match result {
            Ok(true) => {}
            Ok(false) => warn!(row_id = row.id, "Row left processing state before failure"),
            Err(e) => error!(
                row_id = row.id,
                error = %e,
                "Failed to record sync row failure; row stays processing"
            ),
        }
    }
}

fn log_completion(row: &SyncQueueRow, completion: &QueueCompletion) {
    match completion {
        QueueCompletion::Completed => {}
        QueueCompletion::Superseded { pending_hash } => warn!(
            row_id = row.id,
            delivered_hash = %row.content_hash,
            pending_hash = %pending_hash,
            "Row hash changed while processing; newer content was not delivered"
        ),
        QueueCompletion::NotProcessing => {
            warn!(row_id = row.id, "Row left processing state before completion")
        }
    }
}

/// Call the adapter, turning errors and panics into worker errors.
async fn deliver(adapter: &dyn DestinationAdapter, item: &SyncItem) -> WorkerResult<SyncResult> {
    match AssertUnwindSafe(adapter.sync_item(item)).catch_unwind().await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(WorkerError::Adapter(e.to_string())),
        Err(panic) => Err(WorkerError::AdapterPanic(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn page_record(
    row: &SyncQueueRow,
    page: &Page,
    destination_id: Option<String>,
    status: SyncStatus,
    error_message: Option<String>,
) -> RecordUpsert {
    RecordUpsert {
        owner_id: row.owner_id.clone(),
        item_kind: ItemKind::PageText,
        item_id: row.item_id.clone(),
        content_hash: row.content_hash.clone(),
        destination: row.destination.clone(),
        destination_id,
        status,
        page_identity: Some(page.id.clone()),
        collection_identity: Some(page.notebook_id.clone()),
        sequence_number: Some(page.page_number),
        metadata: json!({ "queue_row_id": row.id }),
        error_message,
    }
}

/// Collection-level record for a container the adapter created on the
/// first page it saw.
struct ContainerWrite {
    owner_id: String,
    destination: String,
    notebook_id: String,
    destination_id: Option<String>,
}

impl ContainerWrite {
    fn write(self, conn: &rusqlite::Connection) -> sync_database::DatabaseResult<()> {
        let Some(notebook) = queries::get_notebook(conn, &self.notebook_id)? else {
            warn!(
                notebook_id = %self.notebook_id,
                "Container created for a notebook that is not stored, not recording it"
            );
            return Ok(());
        };
        let pages = queries::list_pages_for_notebook(conn, &self.notebook_id)?;
        let hash = fingerprint_notebook(&notebook.content(&pages));

        queries::upsert_record(
            conn,
            &RecordUpsert {
                owner_id: self.owner_id,
                item_kind: ItemKind::Notebook,
                item_id: self.notebook_id,
                content_hash: hash,
                destination: self.destination,
                destination_id: self.destination_id,
                status: SyncStatus::Success,
                page_identity: None,
                collection_identity: None,
                sequence_number: None,
                metadata: json!({ "created_by": "page_sync" }),
                error_message: None,
            },
        )?;
        Ok(())
    }
}
