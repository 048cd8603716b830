//! The presence store seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use langlab_core::UserId;

use crate::errors::Result;
use crate::record::PresenceRecord;

/// Durable presence storage.
///
/// Only the presence synchronizer writes through this trait. Writes are
/// upserts: the first write for a user creates the record.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Record `user` as online. `lastSeenAt` is left untouched.
    async fn set_online(&self, user: &UserId, at: DateTime<Utc>) -> Result<()>;

    /// Record `user` as offline, last seen at `at`.
    async fn set_offline(&self, user: &UserId, at: DateTime<Utc>) -> Result<()>;

    /// Fetch one record.
    async fn get(&self, user: &UserId) -> Result<Option<PresenceRecord>>;

    /// All records ordered by user id.
    async fn list(&self) -> Result<Vec<PresenceRecord>>;

    /// Mark every online record offline at `at`. Returns how many changed.
    async fn mark_all_offline(&self, at: DateTime<Utc>) -> Result<usize>;
}
