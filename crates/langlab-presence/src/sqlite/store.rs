//! Async [`PresenceStore`] over the `SQLite` pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use langlab_core::UserId;
use rusqlite::Connection;

use crate::errors::{PresenceStoreError, Result};
use crate::record::PresenceRecord;
use crate::sqlite::connection::ConnectionPool;
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repo::PresenceRepo;
use crate::store::PresenceStore;

/// `SQLite`-backed presence store. Each call checks out a pooled connection
/// on the blocking thread pool.
#[derive(Clone)]
pub struct SqlitePresenceStore {
    pool: ConnectionPool,
}

impl SqlitePresenceStore {
    /// Wrap `pool`, applying pending migrations first.
    pub fn open(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self { pool })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| PresenceStoreError::Internal(format!("blocking task failed: {e}")))?
    }
}

impl std::fmt::Debug for SqlitePresenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePresenceStore")
            .field("pool_size", &self.pool.max_size())
            .finish()
    }
}

#[async_trait]
impl PresenceStore for SqlitePresenceStore {
    async fn set_online(&self, user: &UserId, at: DateTime<Utc>) -> Result<()> {
        let user = user.clone();
        self.with_conn(move |conn| PresenceRepo::set_online(conn, user.as_str(), at))
            .await
    }

    async fn set_offline(&self, user: &UserId, at: DateTime<Utc>) -> Result<()> {
        let user = user.clone();
        self.with_conn(move |conn| PresenceRepo::set_offline(conn, user.as_str(), at))
            .await
    }

    async fn get(&self, user: &UserId) -> Result<Option<PresenceRecord>> {
        let user = user.clone();
        self.with_conn(move |conn| PresenceRepo::get(conn, user.as_str()))
            .await
    }

    async fn list(&self) -> Result<Vec<PresenceRecord>> {
        self.with_conn(PresenceRepo::list).await
    }

    async fn mark_all_offline(&self, at: DateTime<Utc>) -> Result<usize> {
        self.with_conn(move |conn| PresenceRepo::mark_all_offline(conn, at))
            .await
    }
}
