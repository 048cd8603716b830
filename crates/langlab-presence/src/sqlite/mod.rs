//! `SQLite` backend for the presence store.
//!
//! - **[`connection`]**: `r2d2` pool with WAL mode and busy timeout applied to
//!   every connection.
//! - **[`migrations`]**: version-tracked schema, embedded at compile time.
//! - **[`repo`]**: stateless SQL functions taking `&Connection`.
//! - **[`store`]**: [`SqlitePresenceStore`], the async adapter that moves
//!   each call onto the blocking pool.

pub mod connection;
pub mod migrations;
pub mod repo;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory};
pub use migrations::{current_version, latest_version, run_migrations};
pub use store::SqlitePresenceStore;
