//! Fakes shared by unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use langlab_auth::{AuthError, TokenVerifier};
use langlab_core::{Identity, Role, UserId};
use langlab_presence::{MemoryPresenceStore, PresenceRecord, PresenceStore, PresenceStoreError};
use langlab_settings::InvalidTokenPolicy;
use tokio::sync::{Notify, mpsc};

use crate::hub::Hub;
use crate::websocket::channel::Outbound;
use crate::websocket::registry::ConnectionRegistry;

/// Accepts tokens of the form `role:user`.
pub(crate) struct PlainVerifier;

impl TokenVerifier for PlainVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let (role, user) = token.split_once(':').ok_or(AuthError::MissingUserId)?;
        let role: Role = role
            .parse()
            .map_err(|_| AuthError::UnknownRole(role.to_owned()))?;
        if user.is_empty() {
            return Err(AuthError::MissingUserId);
        }
        Ok(Identity::new(user, role))
    }
}

/// Store whose every operation fails.
pub(crate) struct FailingStore;

fn disk_full() -> PresenceStoreError {
    PresenceStoreError::Internal("disk full".into())
}

#[async_trait]
impl PresenceStore for FailingStore {
    async fn set_online(&self, _user: &UserId, _at: DateTime<Utc>) -> langlab_presence::Result<()> {
        Err(disk_full())
    }
    async fn set_offline(&self, _user: &UserId, _at: DateTime<Utc>) -> langlab_presence::Result<()> {
        Err(disk_full())
    }
    async fn get(&self, _user: &UserId) -> langlab_presence::Result<Option<PresenceRecord>> {
        Err(disk_full())
    }
    async fn list(&self) -> langlab_presence::Result<Vec<PresenceRecord>> {
        Err(disk_full())
    }
    async fn mark_all_offline(&self, _at: DateTime<Utc>) -> langlab_presence::Result<usize> {
        Err(disk_full())
    }
}

/// Memory store whose writes for one user wait until [`release`](Self::release).
pub(crate) struct GatedStore {
    inner: Arc<MemoryPresenceStore>,
    gated_user: UserId,
    gate: Notify,
}

impl GatedStore {
    pub(crate) fn new(inner: Arc<MemoryPresenceStore>, gated_user: &str) -> Self {
        Self {
            inner,
            gated_user: gated_user.into(),
            gate: Notify::new(),
        }
    }

    pub(crate) fn release(&self) {
        self.gate.notify_one();
    }

    async fn wait_if_gated(&self, user: &UserId) {
        if *user == self.gated_user {
            self.gate.notified().await;
        }
    }
}

#[async_trait]
impl PresenceStore for GatedStore {
    async fn set_online(&self, user: &UserId, at: DateTime<Utc>) -> langlab_presence::Result<()> {
        self.wait_if_gated(user).await;
        self.inner.set_online(user, at).await
    }
    async fn set_offline(&self, user: &UserId, at: DateTime<Utc>) -> langlab_presence::Result<()> {
        self.wait_if_gated(user).await;
        self.inner.set_offline(user, at).await
    }
    async fn get(&self, user: &UserId) -> langlab_presence::Result<Option<PresenceRecord>> {
        self.inner.get(user).await
    }
    async fn list(&self) -> langlab_presence::Result<Vec<PresenceRecord>> {
        self.inner.list().await
    }
    async fn mark_all_offline(&self, at: DateTime<Utc>) -> langlab_presence::Result<usize> {
        self.inner.mark_all_offline(at).await
    }
}

/// Hub over `store` with the plain verifier.
pub(crate) fn hub_with(store: Arc<dyn PresenceStore>, policy: InvalidTokenPolicy) -> Arc<Hub> {
    Arc::new(Hub::new(
        Arc::new(ConnectionRegistry::new(32)),
        store,
        Arc::new(PlainVerifier),
        policy,
    ))
}

/// Pop every queued text frame, parsed as JSON. Pings are skipped.
pub(crate) fn drain_json(rx: &mut mpsc::Receiver<Outbound>) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let Outbound::Text(text) = frame {
            if let Ok(value) = serde_json::from_str(&text) {
                frames.push(value);
            }
        }
    }
    frames
}

/// Pop every queued frame.
pub(crate) fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Outbound> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}
