//! Database model types.

use crate::{encryption, DatabaseError, DatabaseResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sync_core::{ItemKind, NotebookContent, PageContent, RecordIdentity, SyncStatus};

/// Lifecycle of a queue row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl Default for QueueStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Pending,
        }
    }

    /// Pending or processing.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Durable last-known delivery state of one item at one destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: i64,
    pub owner_id: String,
    pub item_kind: ItemKind,
    pub item_id: String,
    pub content_hash: String,
    pub destination: String,
    pub destination_id: Option<String>,
    pub status: SyncStatus,
    pub page_identity: Option<String>,
    pub collection_identity: Option<String>,
    pub sequence_number: Option<i64>,
    pub metadata: serde_json::Value,
    pub error_message: Option<String>,
    pub attempt_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl SyncRecord {
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::resolve(
            self.item_kind,
            self.page_identity.as_deref(),
            &self.content_hash,
        )
    }

    /// A successful delivery of exactly this content.
    pub fn delivered(&self, content_hash: &str) -> bool {
        self.status == SyncStatus::Success && self.content_hash == content_hash
    }
}

/// Input for upserting a sync record.
///
/// A `None` destination id keeps whatever id the record already holds, so
/// a failed attempt does not forget the object delivered earlier.
#[derive(Debug, Clone)]
pub struct RecordUpsert {
    pub owner_id: String,
    pub item_kind: ItemKind,
    pub item_id: String,
    pub content_hash: String,
    pub destination: String,
    pub destination_id: Option<String>,
    pub status: SyncStatus,
    pub page_identity: Option<String>,
    pub collection_identity: Option<String>,
    pub sequence_number: Option<i64>,
    pub metadata: serde_json::Value,
    pub error_message: Option<String>,
}

impl RecordUpsert {
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::resolve(
            self.item_kind,
            self.page_identity.as_deref(),
            &self.content_hash,
        )
    }
}

/// One scheduled delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncQueueRow {
    pub id: i64,
    pub owner_id: String,
    pub item_kind: ItemKind,
    pub item_id: String,
    pub content_hash: String,
    pub page_identity: Option<String>,
    pub collection_identity: Option<String>,
    pub sequence_number: Option<i64>,
    pub destination: String,
    pub status: QueueStatus,
    pub priority: i32,
    pub attempt_count: i64,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncQueueRow {
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::resolve(
            self.item_kind,
            self.page_identity.as_deref(),
            &self.content_hash,
        )
    }
}

/// Input for inserting a queue row.
#[derive(Debug, Clone)]
pub struct NewSyncQueueRow {
    pub owner_id: String,
    pub item_kind: ItemKind,
    pub item_id: String,
    pub content_hash: String,
    pub page_identity: Option<String>,
    pub collection_identity: Option<String>,
    pub sequence_number: Option<i64>,
    pub destination: String,
    pub status: QueueStatus,
    pub priority: i32,
    pub metadata: serde_json::Value,
}

impl NewSyncQueueRow {
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::resolve(
            self.item_kind,
            self.page_identity.as_deref(),
            &self.content_hash,
        )
    }
}

/// How a processing row was completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueCompletion {
    /// The row still carried the delivered hash.
    Completed,
    /// An admission replaced the row's hash while it was processing. The
    /// row now records the delivered hash; `pending_hash` was not delivered.
    Superseded { pending_hash: String },
    /// The row was not processing; nothing changed.
    NotProcessing,
}

/// Row counts per queue status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.completed + self.failed + self.cancelled
    }
}

/// Per-owner destination configuration.
#[derive(Debug, Clone)]
pub struct DestinationConfig {
    pub owner_id: String,
    pub destination: String,
    pub enabled: bool,
    pub todo_only: bool,
    pub supports_todos: bool,
    pub credential_ciphertext: Option<Vec<u8>>,
    pub credential_nonce: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DestinationConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether this destination takes items of `kind`. Todos need a
    /// todo-capable destination; everything else is refused by todo-only ones.
    pub fn accepts(&self, kind: ItemKind) -> bool {
        match kind {
            ItemKind::Todo => self.supports_todos,
            _ => !self.todo_only,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credential_ciphertext.is_some()
    }

    /// Open the sealed credential blob.
    ///
    /// Returns `Ok(None)` when no credentials are stored. A stored blob with
    /// no key to open it is an error.
    pub fn resolve_credentials(&self, key: Option<&[u8; 32]>) -> DatabaseResult<Option<String>> {
        let (Some(ciphertext), Some(nonce)) = (&self.credential_ciphertext, &self.credential_nonce)
        else {
            return Ok(None);
        };
        let key = key.ok_or_else(|| {
            DatabaseError::Encryption(format!(
                "credentials for {} are sealed but no credential key is configured",
                self.destination
            ))
        })?;
        let plaintext = encryption::decrypt_content(key, nonce, ciphertext)?;
        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|e| DatabaseError::InvalidData(format!("credentials are not UTF-8: {}", e)))
    }
}

/// Input for upserting a destination configuration.
#[derive(Debug, Clone)]
pub struct NewDestinationConfig {
    pub owner_id: String,
    pub destination: String,
    pub enabled: bool,
    pub todo_only: bool,
    pub supports_todos: bool,
    pub credential_ciphertext: Option<Vec<u8>>,
    pub credential_nonce: Option<Vec<u8>>,
}

impl NewDestinationConfig {
    pub fn new(owner_id: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            destination: destination.into(),
            enabled: true,
            todo_only: false,
            supports_todos: false,
            credential_ciphertext: None,
            credential_nonce: None,
        }
    }

    /// Seal `secret` under `key` with a fresh nonce.
    pub fn with_credentials(mut self, key: &[u8; 32], secret: &str) -> DatabaseResult<Self> {
        let nonce = encryption::generate_nonce();
        let ciphertext = encryption::encrypt_content(key, &nonce, secret.as_bytes())?;
        self.credential_ciphertext = Some(ciphertext);
        self.credential_nonce = Some(nonce.to_vec());
        Ok(self)
    }
}

/// A notebook (collection of pages).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notebook {
    /// Fingerprintable view of this notebook with its pages' text joined
    /// in page order.
    pub fn content(&self, pages: &[Page]) -> NotebookContent {
        let text = pages
            .iter()
            .map(|page| page.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        NotebookContent {
            title: self.title.clone(),
            page_count: pages.len() as i64,
            text,
            last_opened_at: self.last_opened_at.map(render_timestamp),
            last_modified_at: self.last_modified_at.map(render_timestamp),
        }
    }
}

fn render_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Debug, Clone)]
pub struct NewNotebook {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub last_opened_at: Option<DateTime<Utc>>,
    pub last_modified_at: Option<DateTime<Utc>>,
}

/// A page of a notebook with its extracted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub owner_id: String,
    pub notebook_id: String,
    pub page_number: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn content(&self) -> PageContent {
        PageContent {
            collection_identity: self.notebook_id.clone(),
            sequence_number: self.page_number,
            text: self.text.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPage {
    pub id: String,
    pub owner_id: String,
    pub notebook_id: String,
    pub page_number: i64,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::generate_key;

    fn config(new: NewDestinationConfig) -> DestinationConfig {
        DestinationConfig {
            owner_id: new.owner_id,
            destination: new.destination,
            enabled: new.enabled,
            todo_only: new.todo_only,
            supports_todos: new.supports_todos,
            credential_ciphertext: new.credential_ciphertext,
            credential_nonce: new.credential_nonce,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn queue_status_roundtrip() {
        for status in [
            QueueStatus::Pending,
            QueueStatus::Processing,
            QueueStatus::Completed,
            QueueStatus::Failed,
            QueueStatus::Cancelled,
        ] {
            assert_eq!(QueueStatus::from_str(status.as_str()), status);
        }
        assert!(QueueStatus::Processing.is_active());
        assert!(QueueStatus::Cancelled.is_terminal());
    }

    #[test]
    fn accepts_respects_todo_flags() {
        let mut new = NewDestinationConfig::new("o", "tasks");
        new.todo_only = true;
        new.supports_todos = true;
        let tasks = config(new);
        assert!(tasks.accepts(ItemKind::Todo));
        assert!(!tasks.accepts(ItemKind::PageText));
        assert!(!tasks.accepts(ItemKind::Highlight));

        let notes = config(NewDestinationConfig::new("o", "notes"));
        assert!(!notes.accepts(ItemKind::Todo));
        assert!(notes.accepts(ItemKind::PageText));
    }

    #[test]
    fn credentials_resolve_with_key() {
        let key = generate_key();
        let sealed = config(
            NewDestinationConfig::new("o", "notes")
                .with_credentials(&key, "secret-token")
                .unwrap(),
        );
        assert!(sealed.has_credentials());
        assert_eq!(
            sealed.resolve_credentials(Some(&key)).unwrap().as_deref(),
            Some("secret-token")
        );
        assert!(sealed.resolve_credentials(None).is_err());
        assert!(sealed.resolve_credentials(Some(&generate_key())).is_err());
    }

    #[test]
    fn notebook_content_joins_pages_in_order() {
        let now = Utc::now();
        let page = |n: i64, text: &str| Page {
            id: format!("p{}", n),
            owner_id: "o".into(),
            notebook_id: "nb".into(),
            page_number: n,
            text: text.into(),
            created_at: now,
            updated_at: now,
        };
        let notebook = Notebook {
            id: "nb".into(),
            owner_id: "o".into(),
            title: "Journal".into(),
            last_opened_at: None,
            last_modified_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        let content = notebook.content(&[page(1, "one"), page(2, "two")]);
        assert_eq!(content.text, "one\ntwo");
        assert_eq!(content.page_count, 2);
        assert!(content.last_modified_at.is_some());

        let page_content = page(3, "three").content();
        assert_eq!(page_content.collection_identity, "nb");
        assert_eq!(page_content.sequence_number, 3);
    }

    #[test]
    fn missing_credentials_resolve_to_none() {
        let plain = config(NewDestinationConfig::new("o", "notes"));
        assert_eq!(plain.resolve_credentials(None).unwrap(), None);
    }
}
