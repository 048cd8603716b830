//! Broadcast router: lesson fan-out to every connected peer.

use std::sync::Arc;

use langlab_core::{BroadcastMessage, UserId};
use metrics::counter;
use tracing::{debug, info, warn};

use super::channel::SendError;
use super::registry::{ConnectionRegistry, RoleFilter};
use crate::metrics::{BROADCASTS_TOTAL, BROADCAST_DROPS_TOTAL};

/// Outcome of one fan-out. For logging and tests only; never reported to
/// the sender.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Channels in the snapshot taken at call time.
    pub recipients: usize,
    /// Frames queued.
    pub delivered: usize,
    /// Frames dropped on a full queue.
    pub dropped: usize,
    /// Channels closed before their frame was queued.
    pub skipped: usize,
}

/// Fans a broadcast out to every registered channel.
#[derive(Debug)]
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastRouter {
    /// Router over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `{type:"broadcast", url, from}` to every channel registered
    /// at call time, anonymous ones included. Fire-and-forget per recipient.
    pub fn route(&self, sender: &UserId, url: &str) -> DeliveryReport {
        let message = BroadcastMessage::new(sender.clone(), url);
        let frame = match message.to_outbound().to_json() {
            Ok(json) => Arc::new(json),
            Err(error) => {
                warn!(from = %sender, error = %error, "failed to encode broadcast");
                return DeliveryReport::default();
            }
        };

        let (mut delivered, mut dropped, mut skipped) = (0, 0, 0);
        let recipients = self.registry.for_each_with_role(RoleFilter::Any, |channel| {
            match channel.send_text(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(SendError::Full) => {
                    dropped += 1;
                    warn!(channel = %channel.handle(), "broadcast dropped, queue full");
                }
                Err(SendError::Closed) => {
                    skipped += 1;
                    debug!(channel = %channel.handle(), "skipping closed channel");
                }
            }
        });
        let report = DeliveryReport {
            recipients,
            delivered,
            dropped,
            skipped,
        };

        counter!(BROADCASTS_TOTAL).increment(1);
        if report.dropped > 0 {
            counter!(BROADCAST_DROPS_TOTAL).increment(u64::try_from(report.dropped).unwrap_or(u64::MAX));
        }
        info!(
            from = %message.sender,
            url = %message.url,
            recipients = report.recipients,
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast routed"
        );
        report
    }
}
