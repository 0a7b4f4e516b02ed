//! SQLite storage for the sync engine.
//!
//! This crate provides:
//! - Async SQLite executor with a dedicated thread per connection
//! - Versioned migrations
//! - Model types for sync records, queue rows, destination configuration,
//!   notebooks and pages
//! - ChaCha20-Poly1305 sealing of destination credentials
//! - Query helpers, including the atomic queue claim
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let rows = db.call(|conn| queries::claim_due_batch(conn, 10, Utc::now())).await?;
//! ```
//!
//! Only SQL runs inside `db.call()`. Adapter calls and decryption happen
//! outside it.

mod encryption;
mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;

pub use encryption::{decrypt_content, encrypt_content, generate_key, generate_nonce};
pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::run_migrations;
pub use models::*;
