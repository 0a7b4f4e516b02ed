//! # Observability
//!
//! Centralized structured logging for the syncd workspace.
//!
//! Services are **log producers**: they call [`init_with_config`] once at
//! startup and then use the standard `tracing` macros with structured
//! fields. Every event is written as one JSON object per line to
//! `~/.syncd/logs/syncd.jsonl` (or [`LogConfig::log_path`]), and optionally
//! mirrored to stderr in compact human form.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "syncd".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! })?;
//!
//! tracing::info!(event = "sync_row_completed", row_id = 7, "row delivered");
//! ```
//!
//! Worker processes running side by side append to the same file; each line
//! is flushed on write so lines from different processes never interleave
//! mid-record.

mod json_layer;
mod writer;

use std::path::PathBuf;

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::{default_log_path, LogFileWriter, LogWriterFactory};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "syncd", "syncd-worker").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by the `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.syncd/logs/syncd.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr for foreground runs.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the observability layer with default settings.
pub fn init(service_name: &str) -> std::io::Result<()> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Initialize the observability layer with custom configuration.
///
/// Returns an error if the log file cannot be opened or a global subscriber
/// was already installed.
pub fn init_with_config(config: LogConfig) -> std::io::Result<()> {
    writer::install_subscriber(&config)
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "unknown");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }
}
