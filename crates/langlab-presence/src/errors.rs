//! Error types for the presence store.

use thiserror::Error;

/// Errors that can occur during presence store operations.
#[derive(Debug, Error)]
pub enum PresenceStoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// A stored timestamp could not be parsed.
    #[error("corrupt timestamp for {user_id}: {value}")]
    CorruptTimestamp {
        /// Row owner.
        user_id: String,
        /// Stored text.
        value: String,
    },

    /// Internal error (e.g. blocking task panicked).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for presence store results.
pub type Result<T> = std::result::Result<T, PresenceStoreError>;
