//! Command implementations for the syncd binary.

mod commands;
mod lifecycle;
mod state;

pub use commands::{
    backfill, cancel_row, configure_destination, queue_page, show_status, DestinationSettings,
};
pub use lifecycle::run_daemon;
