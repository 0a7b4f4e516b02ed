//! Configuration, paths, errors, and logging setup for the syncd workspace.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DestinationEndpoint, WorkerSettings, DEFAULT_BATCH_SIZE, DEFAULT_LOG_LEVEL,
    DEFAULT_POLL_INTERVAL_MS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
