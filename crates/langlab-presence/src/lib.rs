//! # langlab-presence
//!
//! Durable presence records: one row per user holding `isOnline` and the
//! last time the user was seen.
//!
//! - [`PresenceStore`]: the async seam the presence synchronizer writes through
//! - [`SqlitePresenceStore`]: `SQLite` implementation on an `r2d2` pool
//! - [`MemoryPresenceStore`]: in-process implementation for tests and
//!   ephemeral runs

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod record;
pub mod sqlite;
pub mod store;

pub use errors::{PresenceStoreError, Result};
pub use memory::MemoryPresenceStore;
pub use record::PresenceRecord;
pub use sqlite::{ConnectionConfig, ConnectionPool, SqlitePresenceStore, new_file, new_in_memory};
pub use store::PresenceStore;
