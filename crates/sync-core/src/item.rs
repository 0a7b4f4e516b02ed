//! Sync item and sync result value types.

use crate::{METADATA_CONTAINER_CREATED, METADATA_CONTAINER_ID};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of logical item being mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Notebook,
    NotebookMetadata,
    PageText,
    Todo,
    Highlight,
}

impl ItemKind {
    pub const ALL: [ItemKind; 5] = [
        Self::Notebook,
        Self::NotebookMetadata,
        Self::PageText,
        Self::Todo,
        Self::Highlight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notebook => "notebook",
            Self::NotebookMetadata => "notebook_metadata",
            Self::PageText => "page_text",
            Self::Todo => "todo",
            Self::Highlight => "highlight",
        }
    }

    /// Parse a stored kind label. Unknown labels yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved destination credentials. Never serialized, redacted in `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

/// A logical item on its way to a destination.
///
/// `data` is opaque to the engine apart from fingerprinting; adapters
/// interpret it. The `existing_*` ids are the previously delivered
/// destination object and container, resolved from sync records so the
/// adapter can update in place instead of creating duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItem {
    pub owner_id: String,
    pub item_kind: ItemKind,
    pub item_id: String,
    pub content_hash: Option<String>,
    pub data: serde_json::Value,
    pub source_table: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub page_identity: Option<String>,
    pub collection_identity: Option<String>,
    pub sequence_number: Option<i64>,
    pub existing_destination_id: Option<String>,
    pub existing_container_id: Option<String>,
    #[serde(skip)]
    pub credentials: Option<Credentials>,
}

impl SyncItem {
    pub fn new(
        owner_id: impl Into<String>,
        item_kind: ItemKind,
        item_id: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            owner_id: owner_id.into(),
            item_kind,
            item_id: item_id.into(),
            content_hash: None,
            data,
            source_table: default_source_table(item_kind).to_string(),
            created_at: now,
            updated_at: now,
            page_identity: None,
            collection_identity: None,
            sequence_number: None,
            existing_destination_id: None,
            existing_container_id: None,
            credentials: None,
        }
    }

    pub fn with_content_hash(mut self, content_hash: impl Into<String>) -> Self {
        self.content_hash = Some(content_hash.into());
        self
    }

    pub fn with_source_table(mut self, source_table: impl Into<String>) -> Self {
        self.source_table = source_table.into();
        self
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

    pub fn with_existing_ids(
        mut self,
        destination_id: Option<String>,
        container_id: Option<String>,
    ) -> Self {
        self.existing_destination_id = destination_id;
        self.existing_container_id = container_id;
        self
    }
}

fn default_source_table(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Notebook | ItemKind::NotebookMetadata => "notebooks",
        ItemKind::PageText => "pages",
        ItemKind::Todo => "todos",
        ItemKind::Highlight => "highlights",
    }
}

/// Outcome status reported by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Failed,
    Retry,
    Skipped,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Retry => "retry",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "success" => Self::Success,
            "retry" => Self::Retry,
            "skipped" => Self::Skipped,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub status: SyncStatus,
    pub destination_id: Option<String>,
    pub error_message: Option<String>,
    pub retry_after: Option<Duration>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SyncResult {
    fn with_status(status: SyncStatus) -> Self {
        Self {
            status,
            destination_id: None,
            error_message: None,
            retry_after: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn success(destination_id: impl Into<String>) -> Self {
        Self {
            destination_id: Some(destination_id.into()),
            ..Self::with_status(SyncStatus::Success)
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            error_message: Some(error_message.into()),
            ..Self::with_status(SyncStatus::Failed)
        }
    }

    pub fn retry(error_message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            error_message: Some(error_message.into()),
            retry_after,
            ..Self::with_status(SyncStatus::Retry)
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        let mut result = Self::with_status(SyncStatus::Skipped);
        result
            .metadata
            .insert("reason".to_string(), serde_json::Value::String(reason.into()));
        result
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }

    /// True when the adapter asked for a later retry. The worker records
    /// these as failures and does not re-admit them on its own.
    pub fn should_retry(&self) -> bool {
        self.status == SyncStatus::Retry
    }

    /// Container id the adapter reported, if any.
    pub fn container_id(&self) -> Option<&str> {
        self.metadata
            .get(METADATA_CONTAINER_ID)
            .and_then(serde_json::Value::as_str)
    }

    /// Whether the adapter created a new destination container for this item.
    pub fn container_created(&self) -> bool {
        self.metadata
            .get(METADATA_CONTAINER_CREATED)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}
