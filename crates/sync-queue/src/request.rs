//! Admission requests and outcomes.

use crate::{QueueError, QueueResult};
use sync_core::{ItemKind, RecordIdentity};
use sync_database::{NewSyncQueueRow, QueueStatus, SyncQueueRow};

pub const MIN_PRIORITY: i32 = 1;
pub const MAX_PRIORITY: i32 = 10;
pub const DEFAULT_PRIORITY: i32 = 5;

/// Priority tiers used by the typed enqueue helpers. Lower runs first.
pub const PRIORITY_TODO: i32 = 2;
pub const PRIORITY_PAGE: i32 = 3;
pub const PRIORITY_HIGHLIGHT: i32 = 4;
pub const PRIORITY_BACKFILL: i32 = 8;

/// One (item, destination) pair a producer wants delivered.
#[derive(Debug, Clone)]
pub struct QueueRequest {
    pub owner_id: String,
    pub item_kind: ItemKind,
    pub item_id: String,
    pub content_hash: String,
    pub destination: String,
    pub page_identity: Option<String>,
    pub collection_identity: Option<String>,
    pub sequence_number: Option<i64>,
    pub priority: i32,
    pub metadata: serde_json::Value,
}

impl QueueRequest {
    pub fn new(
        owner_id: impl Into<String>,
        item_kind: ItemKind,
        item_id: impl Into<String>,
        content_hash: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            item_kind,
            item_id: item_id.into(),
            content_hash: content_hash.into(),
            destination: destination.into(),
            page_identity: None,
            collection_identity: None,
            sequence_number: None,
            priority: DEFAULT_PRIORITY,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_page(
        mut self,
        page_identity: impl Into<String>,
        collection_identity: impl Into<String>,
        sequence_number: i64,
    ) -> Self {
        self.page_identity = Some(page_identity.into());
        self.collection_identity = Some(collection_identity.into());
        self.sequence_number = Some(sequence_number);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Dedup key: page identity for page text, content hash otherwise.
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::resolve(
            self.item_kind,
            self.page_identity.as_deref(),
            &self.content_hash,
        )
    }

    pub(crate) fn validate(&self) -> QueueResult<()> {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(QueueError::InvalidPriority(self.priority));
        }
        for (field, value) in [
            ("owner_id", &self.owner_id),
            ("item_id", &self.item_id),
            ("content_hash", &self.content_hash),
            ("destination", &self.destination),
        ] {
            if value.is_empty() {
                return Err(QueueError::InvalidRequest(format!("{} is empty", field)));
            }
        }
        Ok(())
    }

    pub(crate) fn to_row(&self, status: QueueStatus) -> NewSyncQueueRow {
        NewSyncQueueRow {
            owner_id: self.owner_id.clone(),
            item_kind: self.item_kind,
            item_id: self.item_id.clone(),
            content_hash: self.content_hash.clone(),
            page_identity: self.page_identity.clone(),
            collection_identity: self.collection_identity.clone(),
            sequence_number: self.sequence_number,
            destination: self.destination.clone(),
            status,
            priority: self.priority,
            metadata: self.metadata.clone(),
        }
    }
}

/// Which admission branch produced the returned row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// An active row with the same hash already exists.
    AlreadyQueued,
    /// An active row existed with a different hash; its hash was replaced.
    Superseded,
    /// This exact content was already delivered; a completed audit row was written.
    AlreadyDelivered,
    /// A new pending row was created.
    Scheduled,
}

impl Admission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyQueued => "already_queued",
            Self::Superseded => "superseded",
            Self::AlreadyDelivered => "already_delivered",
            Self::Scheduled => "scheduled",
        }
    }
}

/// Result of one admission call.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub row: SyncQueueRow,
    pub admission: Admission,
}
