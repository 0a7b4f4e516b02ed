//! Content fingerprints.
//!
//! A fingerprint is the hex SHA-256 of a canonical JSON rendering of the
//! fields that define one version of an item. Object keys are sorted at
//! every depth and the output is compact, so logically equal payloads hash
//! identically regardless of key order.
//!
//! Notebook fingerprints only cover the first [`NOTEBOOK_TEXT_PREFIX_CHARS`]
//! characters of the concatenated page text. Two notebooks that differ only
//! past that point share a fingerprint.

use crate::{
    FingerprintError, HighlightContent, ItemKind, NotebookContent, PageContent, TodoContent,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Number of leading characters of notebook text included in its fingerprint.
pub const NOTEBOOK_TEXT_PREFIX_CHARS: usize = 10_000;

/// Hash any JSON value canonically.
pub fn fingerprint_value(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

pub fn fingerprint_notebook(notebook: &NotebookContent) -> String {
    let prefix: String = notebook
        .text
        .chars()
        .take(NOTEBOOK_TEXT_PREFIX_CHARS)
        .collect();
    fingerprint_value(&json!({
        "kind": ItemKind::Notebook.as_str(),
        "title": notebook.title,
        "page_count": notebook.page_count,
        "text": prefix,
        "last_opened_at": notebook.last_opened_at,
        "last_modified_at": notebook.last_modified_at,
    }))
}

/// Metadata-only notebook fingerprint. Page text is ignored entirely.
pub fn fingerprint_notebook_metadata(notebook: &NotebookContent) -> String {
    fingerprint_value(&json!({
        "kind": ItemKind::NotebookMetadata.as_str(),
        "title": notebook.title,
        "page_count": notebook.page_count,
        "last_opened_at": notebook.last_opened_at,
        "last_modified_at": notebook.last_modified_at,
    }))
}

pub fn fingerprint_page(page: &PageContent) -> String {
    fingerprint_value(&json!({
        "kind": ItemKind::PageText.as_str(),
        "collection_identity": page.collection_identity,
        "sequence_number": page.sequence_number,
        "text": page.text,
    }))
}

pub fn fingerprint_todo(todo: &TodoContent) -> String {
    fingerprint_value(&json!({
        "kind": ItemKind::Todo.as_str(),
        "text": todo.text,
        "collection_identity": todo.collection_identity,
        "sequence_number": todo.sequence_number,
    }))
}

pub fn fingerprint_highlight(highlight: &HighlightContent) -> String {
    fingerprint_value(&json!({
        "kind": ItemKind::Highlight.as_str(),
        "original_text": highlight.original_text,
        "corrected_text": highlight.corrected_text,
        "source_identifier": highlight.source_identifier,
        "sequence_number": highlight.sequence_number,
    }))
}

/// Fingerprint an item payload by kind.
///
/// The payload is read as the kind's content struct; keys the kind does not
/// track are ignored, missing required keys are an error.
pub fn fingerprint_item(kind: ItemKind, data: &Value) -> Result<String, FingerprintError> {
    let hash = match kind {
        ItemKind::Notebook => fingerprint_notebook(&parse(kind, data)?),
        ItemKind::NotebookMetadata => fingerprint_notebook_metadata(&parse(kind, data)?),
        ItemKind::PageText => fingerprint_page(&parse(kind, data)?),
        ItemKind::Todo => fingerprint_todo(&parse(kind, data)?),
        ItemKind::Highlight => fingerprint_highlight(&parse(kind, data)?),
    };
    Ok(hash)
}

fn parse<T: DeserializeOwned>(kind: ItemKind, data: &Value) -> Result<T, FingerprintError> {
    T::deserialize(data).map_err(|source| FingerprintError::InvalidPayload { kind, source })
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
