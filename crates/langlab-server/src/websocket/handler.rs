//! Inbound frame dispatch: the channel session state machine.
//!
//! `Open` and `Authenticated` accept `auth`; only an authenticated teacher
//! may `broadcast`. Everything else is dropped and the channel stays open.

use langlab_core::{InboundMessage, ProtocolError, UserId};
use langlab_settings::InvalidTokenPolicy;
use metrics::counter;
use tracing::{debug, info, instrument};

use super::broadcast::DeliveryReport;
use super::channel::Channel;
use crate::hub::{CloseReason, Hub};
use crate::metrics::{AUTH_FAILURES_TOTAL, AUTH_SUCCESS_TOTAL};

/// What handling one frame did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Identity bound. `superseded` is the previously bound user when it
    /// differs from the new one.
    Authenticated {
        /// Newly bound user.
        user_id: UserId,
        /// User replaced on this channel, if different.
        superseded: Option<UserId>,
    },
    /// Token rejected; `closed` if the policy closed the channel.
    AuthRejected {
        /// Whether the channel was closed.
        closed: bool,
    },
    /// Broadcast routed.
    Broadcast(DeliveryReport),
    /// Broadcast from an anonymous or non-teacher channel, dropped.
    BroadcastDenied,
    /// Frame could not be parsed, dropped.
    Malformed,
    /// Channel closed while the frame was being handled.
    ChannelClosed,
}

/// Handle a text frame.
#[instrument(skip_all, fields(channel = %channel.handle()))]
pub fn handle_text(hub: &Hub, channel: &Channel, text: &str) -> HandleOutcome {
    dispatch(hub, channel, InboundMessage::parse(text))
}

/// Handle a binary frame carrying UTF-8 JSON.
#[instrument(skip_all, fields(channel = %channel.handle()))]
pub fn handle_binary(hub: &Hub, channel: &Channel, bytes: &[u8]) -> HandleOutcome {
    dispatch(hub, channel, InboundMessage::parse_bytes(bytes))
}

fn dispatch(
    hub: &Hub,
    channel: &Channel,
    parsed: Result<InboundMessage, ProtocolError>,
) -> HandleOutcome {
    let message = match parsed {
        Ok(message) => message,
        Err(error) => {
            debug!(error = %error, "dropping malformed message");
            return HandleOutcome::Malformed;
        }
    };
    debug!(kind = message.kind(), "message received");

    match message {
        InboundMessage::Auth { token } => authenticate(hub, channel, &token),
        InboundMessage::Broadcast { url } => broadcast(hub, channel, &url),
    }
}

fn authenticate(hub: &Hub, channel: &Channel, token: &str) -> HandleOutcome {
    let identity = match hub.verifier().verify(token) {
        Ok(identity) => identity,
        Err(error) => {
            counter!(AUTH_FAILURES_TOTAL).increment(1);
            debug!(error = %error, "auth rejected");
            let closed = hub.invalid_token_policy() == InvalidTokenPolicy::Close
                && hub.close_channel(channel.handle(), CloseReason::InvalidToken);
            return HandleOutcome::AuthRejected { closed };
        }
    };

    let user_id = identity.user_id.clone();
    let role = identity.role;
    match hub.authenticate(channel.handle(), identity) {
        Ok(previous) => {
            counter!(AUTH_SUCCESS_TOTAL, "role" => role.as_str()).increment(1);
            let superseded = previous
                .map(|p| p.user_id)
                .filter(|prev| *prev != user_id);
            info!(user_id = %user_id, role = %role, "channel authenticated");
            HandleOutcome::Authenticated { user_id, superseded }
        }
        Err(error) => {
            debug!(error = %error, "bind refused");
            HandleOutcome::ChannelClosed
        }
    }
}

fn broadcast(hub: &Hub, channel: &Channel, url: &str) -> HandleOutcome {
    match channel.identity() {
        Some(identity) if identity.role.can_broadcast() => {
            HandleOutcome::Broadcast(hub.router().route(&identity.user_id, url))
        }
        Some(identity) => {
            debug!(user_id = %identity.user_id, role = %identity.role, "broadcast not permitted for role");
            HandleOutcome::BroadcastDenied
        }
        None => {
            debug!("broadcast from unauthenticated channel dropped");
            HandleOutcome::BroadcastDenied
        }
    }
}
