//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` (or a `Transaction`, which derefs to
//! one) as its first parameter, so callers can compose several of them
//! inside a single transaction.

mod configs;
mod content;
mod queue;
mod records;

pub use configs::*;
pub use content::*;
pub use queue::*;
pub use records::*;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use sync_core::{ItemKind, SyncStatus};

/// Render a timestamp for storage.
///
/// Fixed-width microsecond RFC 3339 in UTC, so text comparison in SQL
/// orders the same way as time.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_item_kind(idx: usize, s: String) -> rusqlite::Result<ItemKind> {
    ItemKind::parse(&s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown item kind {:?}", s).into(),
        )
    })
}

fn parse_sync_status(s: String) -> SyncStatus {
    SyncStatus::from_str(&s)
}

fn parse_metadata(s: String) -> serde_json::Value {
    serde_json::from_str(&s).unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
}

fn render_metadata(value: &serde_json::Value) -> String {
    if value.is_null() {
        "{}".to_string()
    } else {
        value.to_string()
    }
}
