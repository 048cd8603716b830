//! In-process presence store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use langlab_core::UserId;
use parking_lot::Mutex;

use crate::errors::Result;
use crate::record::PresenceRecord;
use crate::store::PresenceStore;

/// Presence store held in a `HashMap`. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryPresenceStore {
    records: Mutex<HashMap<UserId, PresenceRecord>>,
}

impl MemoryPresenceStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous read, for tests.
    pub fn snapshot(&self, user: &UserId) -> Option<PresenceRecord> {
        self.records.lock().get(user).cloned()
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn set_online(&self, user: &UserId, at: DateTime<Utc>) -> Result<()> {
        let mut records = self.records.lock();
        let entry = records.entry(user.clone()).or_insert_with(|| PresenceRecord {
            user_id: user.clone(),
            is_online: true,
            last_seen_at: None,
            updated_at: at,
        });
        entry.is_online = true;
        entry.updated_at = at;
        Ok(())
    }

    async fn set_offline(&self, user: &UserId, at: DateTime<Utc>) -> Result<()> {
        let _ = self.records.lock().insert(
            user.clone(),
            PresenceRecord {
                user_id: user.clone(),
                is_online: false,
                last_seen_at: Some(at),
                updated_at: at,
            },
        );
        Ok(())
    }

    async fn get(&self, user: &UserId) -> Result<Option<PresenceRecord>> {
        Ok(self.snapshot(user))
    }

    async fn list(&self) -> Result<Vec<PresenceRecord>> {
        let mut all: Vec<_> = self.records.lock().values().cloned().collect();
        all.sort_by(|a, b| a.user_id.as_str().cmp(b.user_id.as_str()));
        Ok(all)
    }

    async fn mark_all_offline(&self, at: DateTime<Utc>) -> Result<usize> {
        let mut changed = 0;
        for record in self.records.lock().values_mut().filter(|r| r.is_online) {
            record.is_online = false;
            record.last_seen_at = Some(at);
            record.updated_at = at;
            changed += 1;
        }
        Ok(changed)
    }
}
