//! Logging initialization for syncd processes.
//!
//! Delegates to the observability package, which writes structured JSONL to
//! `~/.syncd/logs/syncd.jsonl` and optionally mirrors to stderr.

use observability::LogConfig;
use std::path::PathBuf;

/// Initialize the logging system for the `syncd` service.
///
/// Log level comes from `RUST_LOG` when set, otherwise from `level`.
/// Failing to open the log file is reported on stderr and does not abort
/// the process.
pub fn init_logging(level: &str) {
    init_logging_for_service("syncd", level, None);
}

/// Initialize logging with a custom service name and optional log file.
pub fn init_logging_for_service(service_name: &str, level: &str, log_path: Option<PathBuf>) {
    let result = observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path,
        also_stderr: true,
    });

    if let Err(e) = result {
        eprintln!("syncd: logging disabled: {}", e);
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
