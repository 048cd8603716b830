//! Shared coordination state and the channel open/authenticate/close paths.

use std::sync::Arc;

use chrono::Utc;
use langlab_auth::TokenVerifier;
use langlab_core::{ChannelHandle, Identity};
use langlab_presence::PresenceStore;
use langlab_settings::InvalidTokenPolicy;
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::info;

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use crate::websocket::broadcast::BroadcastRouter;
use crate::websocket::channel::{Channel, Outbound};
use crate::websocket::presence::PresenceSynchronizer;
use crate::websocket::registry::{ConnectionRegistry, RegistryError};

/// Why a channel was closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame or the stream ended.
    ClientClosed,
    /// Reading from the socket failed.
    TransportError,
    /// Missed two consecutive liveness probes.
    LivenessTimeout,
    /// Presented an invalid token under the `close` policy.
    InvalidToken,
    /// Server shutting down.
    Shutdown,
}

impl CloseReason {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::TransportError => "transport_error",
            Self::LivenessTimeout => "liveness_timeout",
            Self::InvalidToken => "invalid_token",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Registry, presence synchronizer, broadcast router and token verifier,
/// shared by every channel session and the liveness monitor.
pub struct Hub {
    registry: Arc<ConnectionRegistry>,
    presence: PresenceSynchronizer,
    router: BroadcastRouter,
    verifier: Arc<dyn TokenVerifier>,
    invalid_token_policy: InvalidTokenPolicy,
}

impl Hub {
    /// Wire up the coordination components.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn PresenceStore>,
        verifier: Arc<dyn TokenVerifier>,
        invalid_token_policy: InvalidTokenPolicy,
    ) -> Self {
        Self {
            presence: PresenceSynchronizer::new(store, Arc::clone(&registry)),
            router: BroadcastRouter::new(Arc::clone(&registry)),
            registry,
            verifier,
            invalid_token_policy,
        }
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The presence synchronizer.
    pub fn presence(&self) -> &PresenceSynchronizer {
        &self.presence
    }

    /// The broadcast router.
    pub fn router(&self) -> &BroadcastRouter {
        &self.router
    }

    /// The token verifier.
    pub fn verifier(&self) -> &dyn TokenVerifier {
        self.verifier.as_ref()
    }

    /// Configured invalid-token handling.
    pub fn invalid_token_policy(&self) -> InvalidTokenPolicy {
        self.invalid_token_policy
    }

    /// Register a new anonymous channel.
    pub fn open_channel(&self) -> (Arc<Channel>, mpsc::Receiver<Outbound>) {
        let (channel, rx) = self.registry.register();
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(channel = %channel.handle(), "channel opened");
        (channel, rx)
    }

    /// Bind `identity` to `handle` and record the user online.
    ///
    /// If the channel was bound to a different user, that user is recorded
    /// offline first. Both updates are enqueued under the channel's state
    /// lock, so they are ordered against a concurrent close.
    pub fn authenticate(
        &self,
        handle: ChannelHandle,
        identity: Identity,
    ) -> Result<Option<Identity>, RegistryError> {
        self.registry.bind_with(handle, identity, |previous, current| {
            if let Some(previous) = previous.filter(|p| p.user_id != current.user_id) {
                self.presence.mark_offline(&previous.user_id, Utc::now());
            }
            self.presence.mark_online(&current.user_id);
        })
    }

    /// Close `handle` through the single close path: unregister and, if it
    /// was authenticated, record the user offline now.
    ///
    /// Returns `false` if the channel was already closed.
    pub fn close_channel(&self, handle: ChannelHandle, reason: CloseReason) -> bool {
        let closed = self.registry.unregister_with(handle, |state| {
            if let Some(identity) = state.identity() {
                self.presence.mark_offline(&identity.user_id, Utc::now());
            }
        });
        let Some(previous) = closed else {
            return false;
        };

        counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        match previous.identity() {
            Some(identity) => info!(
                channel = %handle,
                reason = reason.as_str(),
                user_id = %identity.user_id,
                role = %identity.role,
                "channel closed"
            ),
            None => info!(channel = %handle, reason = reason.as_str(), "channel closed"),
        }
        true
    }

    /// Close every registered channel. Returns how many were closed.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        self.registry
            .snapshot()
            .iter()
            .filter(|channel| self.close_channel(channel.handle(), reason))
            .count()
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("registry", &self.registry)
            .field("presence", &self.presence)
            .field("invalid_token_policy", &self.invalid_token_policy)
            .finish_non_exhaustive()
    }
}
