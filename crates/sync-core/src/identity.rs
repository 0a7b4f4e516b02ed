//! Dedup identity of a logical item at a destination.

use crate::{ItemKind, SyncItem};
use std::fmt;

/// The key used both for "at most one active queue row" and for "at most
/// one sync record" per owner and destination.
///
/// Page text keeps one identity while its content changes, so it is keyed by
/// page identity. Every other kind is keyed by its content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordIdentity {
    Page(String),
    Content(String),
}

impl RecordIdentity {
    pub const PAGE_LABEL: &'static str = "page";
    pub const CONTENT_LABEL: &'static str = "content";

    /// Pick the identity for an item kind. Page text without a page identity
    /// falls back to its content hash.
    pub fn resolve(kind: ItemKind, page_identity: Option<&str>, content_hash: &str) -> Self {
        match (kind, page_identity) {
            (ItemKind::PageText, Some(page)) if !page.is_empty() => Self::Page(page.to_string()),
            _ => Self::Content(content_hash.to_string()),
        }
    }

    /// Identity of an item whose content hash is already set.
    pub fn for_item(item: &SyncItem) -> Option<Self> {
        let hash = item.content_hash.as_deref()?;
        Some(Self::resolve(
            item.item_kind,
            item.page_identity.as_deref(),
            hash,
        ))
    }

    /// Storage label (`identity_kind` column).
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Page(_) => Self::PAGE_LABEL,
            Self::Content(_) => Self::CONTENT_LABEL,
        }
    }

    /// Storage key (`dedup_key` column).
    pub fn key(&self) -> &str {
        match self {
            Self::Page(key) | Self::Content(key) => key,
        }
    }

    pub fn from_parts(kind_label: &str, key: impl Into<String>) -> Option<Self> {
        match kind_label {
            Self::PAGE_LABEL => Some(Self::Page(key.into())),
            Self::CONTENT_LABEL => Some(Self::Content(key.into())),
            _ => None,
        }
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind_label(), self.key())
    }
}
