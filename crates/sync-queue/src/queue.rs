//! The sync queue.

use crate::request::{PRIORITY_BACKFILL, PRIORITY_HIGHLIGHT, PRIORITY_PAGE, PRIORITY_TODO};
use crate::{Admission, Admitted, QueueError, QueueRequest, QueueResult};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde_json::json;
use sync_core::{
    fingerprint_highlight, fingerprint_page, fingerprint_todo, HighlightContent, ItemKind,
    TodoContent,
};
use sync_database::{
    queries, AsyncDatabase, DatabaseResult, DestinationConfig, QueueStats, QueueStatus,
    SyncQueueRow,
};
use tracing::{debug, info, warn};

/// Durable, deduplicating sync queue.
///
/// Cheap to clone; all state lives in the database.
#[derive(Clone)]
pub struct SyncQueue {
    db: AsyncDatabase,
}

impl SyncQueue {
    pub fn new(db: AsyncDatabase) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &AsyncDatabase {
        &self.db
    }

    /// Admit one (item, destination) pair and return its queue row.
    ///
    /// Inspect the row's `status` to learn whether work is pending.
    pub async fn queue_sync(&self, request: QueueRequest) -> QueueResult<SyncQueueRow> {
        Ok(self.admit(request).await?.row)
    }

    /// Admit one (item, destination) pair, also reporting the branch taken.
    ///
    /// The decision runs in a single immediate transaction:
    /// 1. an active row for the identity is returned, with its hash replaced
    ///    when the new hash differs;
    /// 2. otherwise a successful record with the same hash yields a new
    ///    `completed` audit row and no work;
    /// 3. otherwise a new `pending` row is scheduled now.
    pub async fn admit(&self, request: QueueRequest) -> QueueResult<Admitted> {
        request.validate()?;

        let admitted = self
            .db
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let admitted = admit_in_transaction(&tx, &request, Utc::now())?;
                tx.commit()?;
                Ok(admitted)
            })
            .await?;

        debug!(
            row_id = admitted.row.id,
            owner_id = %admitted.row.owner_id,
            destination = %admitted.row.destination,
            item_kind = %admitted.row.item_kind,
            admission = admitted.admission.as_str(),
            "Admitted sync request"
        );
        Ok(admitted)
    }

    /// Queue a stored page for every enabled destination that takes pages.
    pub async fn queue_page_sync(
        &self,
        owner_id: &str,
        page_id: &str,
    ) -> QueueResult<Vec<SyncQueueRow>> {
        let owner = owner_id.to_string();
        let id = page_id.to_string();
        let (page, configs) = self
            .db
            .call(move |conn| {
                let page = queries::get_page(conn, &id)?;
                let configs = queries::list_enabled_destination_configs(conn, &owner)?;
                Ok((page, configs))
            })
            .await?;

        let page = page
            .filter(|page| page.owner_id == owner_id)
            .ok_or_else(|| QueueError::ContentNotFound(format!("page {}", page_id)))?;
        let hash = fingerprint_page(&page.content());

        let mut rows = Vec::new();
        for config in compatible(&configs, ItemKind::PageText) {
            let request = QueueRequest::new(
                owner_id,
                ItemKind::PageText,
                &page.id,
                &hash,
                &config.destination,
            )
            .with_page(&page.id, &page.notebook_id, page.page_number)
            .with_priority(PRIORITY_PAGE);
            rows.push(self.queue_sync(request).await?);
        }
        Ok(rows)
    }

    /// Queue a todo for every enabled todo-capable destination.
    pub async fn queue_todo_sync(
        &self,
        owner_id: &str,
        todo_id: &str,
        todo: &TodoContent,
    ) -> QueueResult<Vec<SyncQueueRow>> {
        let hash = fingerprint_todo(todo);
        let metadata = json!({ "content": todo });
        self.queue_for_compatible(owner_id, ItemKind::Todo, todo_id, &hash, PRIORITY_TODO, metadata)
            .await
    }

    /// Queue a highlight for every enabled destination that is not todo-only.
    pub async fn queue_highlight_sync(
        &self,
        owner_id: &str,
        highlight_id: &str,
        highlight: &HighlightContent,
    ) -> QueueResult<Vec<SyncQueueRow>> {
        let hash = fingerprint_highlight(highlight);
        let metadata = json!({ "content": highlight });
        self.queue_for_compatible(
            owner_id,
            ItemKind::Highlight,
            highlight_id,
            &hash,
            PRIORITY_HIGHLIGHT,
            metadata,
        )
        .await
    }

    /// Queue every page of a stored notebook at backfill priority.
    pub async fn queue_notebook_backfill(
        &self,
        owner_id: &str,
        notebook_id: &str,
    ) -> QueueResult<Vec<SyncQueueRow>> {
        let owner = owner_id.to_string();
        let id = notebook_id.to_string();
        let (notebook, pages, configs) = self
            .db
            .call(move |conn| {
                let notebook = queries::get_notebook(conn, &id)?;
                let pages = queries::list_pages_for_notebook(conn, &id)?;
                let configs = queries::list_enabled_destination_configs(conn, &owner)?;
                Ok((notebook, pages, configs))
            })
            .await?;

        notebook
            .filter(|notebook| notebook.owner_id == owner_id)
            .ok_or_else(|| QueueError::ContentNotFound(format!("notebook {}", notebook_id)))?;

        let destinations: Vec<&DestinationConfig> = compatible(&configs, ItemKind::PageText).collect();
        let mut rows = Vec::with_capacity(pages.len() * destinations.len());
        for page in &pages {
            let hash = fingerprint_page(&page.content());
            for config in &destinations {
                let request = QueueRequest::new(
                    owner_id,
                    ItemKind::PageText,
                    &page.id,
                    &hash,
                    &config.destination,
                )
                .with_page(&page.id, &page.notebook_id, page.page_number)
                .with_priority(PRIORITY_BACKFILL)
                .with_metadata(json!({ "reason": "backfill" }));
                rows.push(self.queue_sync(request).await?);
            }
        }

        info!(
            owner_id,
            notebook_id,
            pages = pages.len(),
            destinations = destinations.len(),
            "Queued notebook backfill"
        );
        Ok(rows)
    }

    /// Due pending rows, most urgent first.
    pub async fn get_next_due(&self, limit: usize) -> QueueResult<Vec<SyncQueueRow>> {
        self.get_next_due_at(limit, Utc::now()).await
    }

    pub async fn get_next_due_at(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> QueueResult<Vec<SyncQueueRow>> {
        Ok(self
            .db
            .call(move |conn| queries::get_next_due(conn, limit, now))
            .await?)
    }

    pub async fn get_row(&self, id: i64) -> QueueResult<Option<SyncQueueRow>> {
        Ok(self
            .db
            .call(move |conn| queries::get_queue_row(conn, id))
            .await?)
    }

    /// Cancel a pending row.
    ///
    /// Returns false (and changes nothing) when the row is already
    /// processing or terminal.
    pub async fn cancel(&self, id: i64) -> QueueResult<bool> {
        let (cancelled, row) = self
            .db
            .call(move |conn| {
                let cancelled = queries::cancel_queue_row(conn, id)?;
                let row = queries::get_queue_row(conn, id)?;
                Ok((cancelled, row))
            })
            .await?;

        let row = row.ok_or(QueueError::RowNotFound(id))?;
        if cancelled {
            info!(row_id = id, "Cancelled queue row");
        } else {
            warn!(row_id = id, status = row.status.as_str(), "Queue row is not pending, not cancelled");
        }
        Ok(cancelled)
    }

    pub async fn stats(&self, owner_id: Option<&str>) -> QueueResult<QueueStats> {
        let owner = owner_id.map(str::to_string);
        Ok(self
            .db
            .call(move |conn| queries::queue_stats(conn, owner.as_deref()))
            .await?)
    }

    async fn queue_for_compatible(
        &self,
        owner_id: &str,
        kind: ItemKind,
        item_id: &str,
        hash: &str,
        priority: i32,
        metadata: serde_json::Value,
    ) -> QueueResult<Vec<SyncQueueRow>> {
        let owner = owner_id.to_string();
        let configs = self
            .db
            .call(move |conn| queries::list_enabled_destination_configs(conn, &owner))
            .await?;

        let mut rows = Vec::new();
        for config in compatible(&configs, kind) {
            let request = QueueRequest::new(owner_id, kind, item_id, hash, &config.destination)
                .with_priority(priority)
                .with_metadata(metadata.clone());
            rows.push(self.queue_sync(request).await?);
        }
        if rows.is_empty() {
            debug!(owner_id, item_kind = %kind, item_id, "No compatible destination, nothing queued");
        }
        Ok(rows)
    }
}

fn compatible(
    configs: &[DestinationConfig],
    kind: ItemKind,
) -> impl Iterator<Item = &DestinationConfig> {
    configs
        .iter()
        .filter(move |config| config.is_enabled() && config.accepts(kind))
}

fn admit_in_transaction(
    conn: &Connection,
    request: &QueueRequest,
    now: DateTime<Utc>,
) -> DatabaseResult<Admitted> {
    let identity = request.identity();

    if let Some(active) =
        queries::find_active_queue_row(conn, &request.owner_id, &request.destination, &identity)?
    {
        if active.content_hash == request.content_hash {
            return Ok(Admitted {
                row: active,
                admission: Admission::AlreadyQueued,
            });
        }
        let row = queries::update_queue_row_hash(conn, active.id, &request.content_hash)?;
        return Ok(Admitted {
            row,
            admission: Admission::Superseded,
        });
    }

    let record = queries::find_record(conn, &request.owner_id, &request.destination, &identity)?;
    if record.is_some_and(|record| record.delivered(&request.content_hash)) {
        let mut audit = request.to_row(QueueStatus::Completed);
        if let serde_json::Value::Object(map) = &mut audit.metadata {
            map.insert("admission".into(), json!(Admission::AlreadyDelivered.as_str()));
        }
        let row = queries::insert_queue_row(conn, &audit, now)?;
        return Ok(Admitted {
            row,
            admission: Admission::AlreadyDelivered,
        });
    }

    match queries::insert_queue_row(conn, &request.to_row(QueueStatus::Pending), now) {
        Ok(row) => Ok(Admitted {
            row,
            admission: Admission::Scheduled,
        }),
        Err(e) if e.is_constraint_violation() => {
            // Another admitter won the race for this identity.
            let winner = queries::find_active_queue_row(
                conn,
                &request.owner_id,
                &request.destination,
                &identity,
            )?;
            match winner {
                Some(row) => Ok(Admitted {
                    row,
                    admission: Admission::AlreadyQueued,
                }),
                None => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}
