//! Presence synchronizer: durable online/offline writes plus live
//! notifications to presence observers.
//!
//! Every user gets a FIFO lane: an unbounded queue drained by one worker
//! task. Updates for one user apply in the order they were enqueued; a slow
//! store write for one user never delays another user, the broadcast path or
//! the liveness path. There is no ordering across users. A lane that stays
//! idle for [`LANE_IDLE_TIMEOUT`] removes itself; the next update for that
//! user starts a fresh one.
//!
//! Each update is written to the store first and then published to every
//! channel bound with the teacher role. A failed write is logged and the
//! notification still goes out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use langlab_core::{OutboundMessage, Role, UserId};
use langlab_presence::PresenceStore;
use metrics::counter;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::registry::{ConnectionRegistry, RoleFilter};
use crate::metrics::PRESENCE_WRITE_FAILURES_TOTAL;

/// One status change for one user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresenceUpdate {
    /// The user.
    pub user_id: UserId,
    /// New status.
    pub online: bool,
    /// When the change happened.
    pub at: DateTime<Utc>,
}

/// How long a lane waits for work before exiting.
pub const LANE_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

enum LaneCommand {
    Apply(PresenceUpdate),
    Flush(oneshot::Sender<()>),
}

struct Lane {
    id: u64,
    tx: mpsc::UnboundedSender<LaneCommand>,
}

type Lanes = Arc<DashMap<UserId, Lane>>;

/// Writes presence changes and notifies observers, ordered per user.
pub struct PresenceSynchronizer {
    store: Arc<dyn PresenceStore>,
    registry: Arc<ConnectionRegistry>,
    lanes: Lanes,
    next_lane: AtomicU64,
}

impl PresenceSynchronizer {
    /// Synchronizer writing to `store` and publishing to `registry`.
    pub fn new(store: Arc<dyn PresenceStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            store,
            registry,
            lanes: Arc::new(DashMap::new()),
            next_lane: AtomicU64::new(0),
        }
    }

    /// Record `user` online now. Never blocks.
    pub fn mark_online(&self, user: &UserId) {
        self.enqueue(PresenceUpdate {
            user_id: user.clone(),
            online: true,
            at: Utc::now(),
        });
    }

    /// Record `user` offline, last seen at `at`. Never blocks.
    pub fn mark_offline(&self, user: &UserId, at: DateTime<Utc>) {
        self.enqueue(PresenceUpdate {
            user_id: user.clone(),
            online: false,
            at,
        });
    }

    /// Wait until every update enqueued before this call has been applied.
    pub async fn flush(&self) {
        let pending: Vec<oneshot::Receiver<()>> = self
            .lanes
            .iter()
            .filter_map(|lane| {
                let (tx, rx) = oneshot::channel();
                lane.value().tx.send(LaneCommand::Flush(tx)).ok().map(|()| rx)
            })
            .collect();
        for rx in pending {
            let _ = rx.await;
        }
    }

    /// Number of running user lanes.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// The store updates are written to.
    pub fn store(&self) -> &Arc<dyn PresenceStore> {
        &self.store
    }

    fn enqueue(&self, update: PresenceUpdate) {
        let user = update.user_id.clone();
        let mut lane = self
            .lanes
            .entry(user.clone())
            .or_insert_with(|| self.spawn_lane(user.clone()));
        if let Err(mpsc::error::SendError(command)) = lane.tx.send(LaneCommand::Apply(update)) {
            warn!(user_id = %user, "presence lane stopped, restarting");
            let replacement = self.spawn_lane(user);
            let _ = replacement.tx.send(command);
            *lane = replacement;
        }
    }

    fn spawn_lane(&self, user: UserId) -> Lane {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_lane.fetch_add(1, Ordering::Relaxed);
        debug!(user_id = %user, lane = id, "presence lane started");
        let _ = tokio::spawn(run_lane(
            LaneWorker {
                user,
                id,
                rx,
                lanes: Arc::clone(&self.lanes),
            },
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
        ));
        Lane { id, tx }
    }
}

impl std::fmt::Debug for PresenceSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceSynchronizer")
            .field("lanes", &self.lanes.len())
            .finish_non_exhaustive()
    }
}

struct LaneWorker {
    user: UserId,
    id: u64,
    rx: mpsc::UnboundedReceiver<LaneCommand>,
    lanes: Lanes,
}

impl LaneWorker {
    /// Next command, or `None` once the lane should stop.
    ///
    /// After an idle timeout the lane removes its own map entry, but only if
    /// the entry is still this lane and nothing was queued in the meantime.
    /// Senders hold the same entry lock, so no update can slip in between
    /// the emptiness check and the removal.
    async fn next(&mut self) -> Option<LaneCommand> {
        loop {
            if let Ok(command) = tokio::time::timeout(LANE_IDLE_TIMEOUT, self.rx.recv()).await {
                return command;
            }
            let Entry::Occupied(entry) = self.lanes.entry(self.user.clone()) else {
                return None;
            };
            if entry.get().id != self.id {
                return None;
            }
            match self.rx.try_recv() {
                Ok(command) => return Some(command),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                    let _ = entry.remove();
                    debug!(user_id = %self.user, lane = self.id, "presence lane idle, stopped");
                    return None;
                }
            }
        }
    }
}

async fn run_lane(
    mut worker: LaneWorker,
    store: Arc<dyn PresenceStore>,
    registry: Arc<ConnectionRegistry>,
) {
    while let Some(command) = worker.next().await {
        match command {
            LaneCommand::Apply(update) => apply(store.as_ref(), &registry, update).await,
            LaneCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

async fn apply(store: &dyn PresenceStore, registry: &ConnectionRegistry, update: PresenceUpdate) {
    let PresenceUpdate { user_id, online, at } = update;

    let written = if online {
        store.set_online(&user_id, at).await
    } else {
        store.set_offline(&user_id, at).await
    };
    if let Err(error) = written {
        let op = if online { "set_online" } else { "set_offline" };
        counter!(PRESENCE_WRITE_FAILURES_TOTAL, "op" => op).increment(1);
        warn!(user_id = %user_id, online, error = %error, "presence write failed");
    }

    let frame = match (OutboundMessage::Presence {
        user_id: user_id.clone(),
        online,
    })
    .to_json()
    {
        Ok(json) => Arc::new(json),
        Err(error) => {
            warn!(user_id = %user_id, error = %error, "failed to encode presence update");
            return;
        }
    };

    let observers = registry.for_each_with_role(RoleFilter::Role(Role::Teacher), |channel| {
        if let Err(reason) = channel.send_text(Arc::clone(&frame)) {
            debug!(channel = %channel.handle(), ?reason, "presence notification dropped");
        }
    });
    debug!(user_id = %user_id, online, observers, "presence published");
}
