//! Liveness monitor: ping every channel each interval and evict those that
//! stayed silent for a whole cycle.
//!
//! A cycle clears each channel's liveness flag and queues a ping; a pong
//! sets the flag again. A channel whose flag is still clear at the next
//! cycle is closed through the normal close path. A silent channel
//! therefore survives its first cycle and is evicted on the second.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::hub::{CloseReason, Hub};
use crate::metrics::LIVENESS_EVICTIONS_TOTAL;

/// What one probe cycle did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Channels that were pinged.
    pub probed: usize,
    /// Channels evicted for missing the previous probe.
    pub evicted: usize,
}

/// Periodic ping/pong prober.
#[derive(Debug)]
pub struct LivenessMonitor {
    hub: Arc<Hub>,
    interval: Duration,
}

impl LivenessMonitor {
    /// Monitor over `hub` probing every `interval`.
    pub fn new(hub: Arc<Hub>, interval: Duration) -> Self {
        Self { hub, interval }
    }

    /// Run one probe cycle over a registry snapshot.
    pub fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let _ = self.hub.registry().for_each(|channel| {
            if channel.check_alive() {
                if let Err(reason) = channel.send_ping() {
                    debug!(channel = %channel.handle(), ?reason, "ping not queued");
                }
                report.probed += 1;
            } else {
                info!(
                    channel = %channel.handle(),
                    silent_for_ms = u64::try_from(channel.last_pong_elapsed().as_millis()).unwrap_or(u64::MAX),
                    "liveness probe missed, evicting"
                );
                if self.hub.close_channel(channel.handle(), CloseReason::LivenessTimeout) {
                    counter!(LIVENESS_EVICTIONS_TOTAL).increment(1);
                    report.evicted += 1;
                }
            }
        });
        report
    }

    /// Probe every interval until `cancel` fires. The first cycle runs one
    /// interval after start.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let _ = ticker.tick().await;
        info!(interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX), "liveness monitor started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.run_cycle();
                    if report.evicted > 0 || report.probed > 0 {
                        debug!(probed = report.probed, evicted = report.evicted, "liveness cycle");
                    }
                }
            }
        }
        info!("liveness monitor stopped");
    }
}
