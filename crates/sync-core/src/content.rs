//! Typed views of the fields each item kind is fingerprinted over.
//!
//! Payloads may carry extra keys for the adapter; deserializing into these
//! structs drops them, so only tracked fields influence the hash.

use serde::{Deserialize, Serialize};

/// A notebook (collection) and its concatenated page text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookContent {
    pub title: String,
    pub page_count: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub last_opened_at: Option<String>,
    #[serde(default)]
    pub last_modified_at: Option<String>,
}

/// Extracted text of a single page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    pub collection_identity: String,
    pub sequence_number: i64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoContent {
    pub text: String,
    #[serde(default)]
    pub collection_identity: Option<String>,
    #[serde(default)]
    pub sequence_number: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightContent {
    pub original_text: String,
    #[serde(default)]
    pub corrected_text: Option<String>,
    pub source_identifier: String,
    #[serde(default)]
    pub sequence_number: Option<i64>,
}
