//! One registered WebSocket channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use langlab_core::{ChannelHandle, Identity, Role};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a channel. `Closed` is terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Connected, no identity bound yet.
    Open,
    /// Bound to a verified identity.
    Authenticated(Identity),
    /// Unregistered; nothing may be bound or sent.
    Closed,
}

impl ChannelState {
    /// The bound identity, if any.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            Self::Open | Self::Closed => None,
        }
    }
}

/// A frame queued for the channel's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// JSON text frame.
    Text(Arc<String>),
    /// Transport-level liveness probe.
    Ping,
}

/// Why a send was not queued.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendError {
    /// The channel is closed.
    Closed,
    /// The outbound queue is full.
    Full,
}

/// A live channel. Owned by the registry; sessions and iterators hold
/// `Arc` clones.
pub struct Channel {
    handle: ChannelHandle,
    state: Mutex<ChannelState>,
    tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    connected_at: Instant,
    alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped: AtomicU64,
}

impl Channel {
    /// A new anonymous channel feeding `tx`.
    pub fn new(handle: ChannelHandle, tx: mpsc::Sender<Outbound>) -> Self {
        let now = Instant::now();
        Self {
            handle,
            state: Mutex::new(ChannelState::Open),
            tx,
            cancel: CancellationToken::new(),
            connected_at: now,
            alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped: AtomicU64::new(0),
        }
    }

    /// This channel's handle.
    pub fn handle(&self) -> ChannelHandle {
        self.handle
    }

    /// Current state (cloned).
    pub fn state(&self) -> ChannelState {
        self.state.lock().clone()
    }

    /// Bound identity, if authenticated.
    pub fn identity(&self) -> Option<Identity> {
        self.state.lock().identity().cloned()
    }

    /// Bound role, if authenticated.
    pub fn role(&self) -> Option<Role> {
        self.state.lock().identity().map(|i| i.role)
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(*self.state.lock(), ChannelState::Closed)
    }

    /// Bind `identity`, replacing any previous one.
    ///
    /// `on_bound` runs with the state lock held, receiving the previous
    /// identity. Returns `None` without calling `on_bound` if the channel is
    /// already closed.
    pub(crate) fn bind_with(
        &self,
        identity: Identity,
        on_bound: impl FnOnce(Option<&Identity>, &Identity),
    ) -> Option<Option<Identity>> {
        let mut state = self.state.lock();
        if matches!(*state, ChannelState::Closed) {
            return None;
        }
        let previous = std::mem::replace(&mut *state, ChannelState::Authenticated(identity));
        let previous = match previous {
            ChannelState::Authenticated(prev) => Some(prev),
            ChannelState::Open | ChannelState::Closed => None,
        };
        if let ChannelState::Authenticated(current) = &*state {
            on_bound(previous.as_ref(), current);
        }
        Some(previous)
    }

    /// Transition to `Closed` and cancel the writer.
    ///
    /// Only the first call observes the pre-close state: it runs `on_closed`
    /// with the state lock held and returns that state. Later calls return
    /// `None`.
    pub(crate) fn close_with(&self, on_closed: impl FnOnce(&ChannelState)) -> Option<ChannelState> {
        let mut state = self.state.lock();
        if matches!(*state, ChannelState::Closed) {
            return None;
        }
        let previous = std::mem::replace(&mut *state, ChannelState::Closed);
        on_closed(&previous);
        drop(state);
        self.cancel.cancel();
        Some(previous)
    }

    /// Queue a text frame. Never blocks.
    pub fn send_text(&self, text: Arc<String>) -> Result<(), SendError> {
        self.enqueue(Outbound::Text(text))
    }

    /// Queue a ping frame.
    pub fn send_ping(&self) -> Result<(), SendError> {
        self.enqueue(Outbound::Ping)
    }

    fn enqueue(&self, frame: Outbound) -> Result<(), SendError> {
        if self.cancel.is_cancelled() {
            return Err(SendError::Closed);
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SendError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SendError::Closed)
            }
        }
    }

    /// Messages dropped because the queue was full or gone.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Record a pong.
    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Clear the liveness flag, returning whether it was set.
    pub fn check_alive(&self) -> bool {
        self.alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last pong (or since connecting).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Channel age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Token cancelled when the channel closes.
    pub fn close_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("handle", &self.handle)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_channel(capacity: usize) -> (Channel, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Channel::new(ChannelHandle::next(), tx), rx)
    }

    #[test]
    fn starts_open_and_alive() {
        let (ch, _rx) = make_channel(4);
        assert_eq!(ch.state(), ChannelState::Open);
        assert!(ch.identity().is_none());
        assert!(ch.check_alive());
        assert!(!ch.check_alive());
    }

    #[test]
    fn bind_replaces_identity() {
        let (ch, _rx) = make_channel(4);
        let first = ch.bind_with(Identity::new("s1", Role::Student), |_, _| {});
        assert_eq!(first, Some(None));
        let second = ch.bind_with(Identity::new("s2", Role::Student), |prev, cur| {
            assert_eq!(prev.unwrap().user_id.as_str(), "s1");
            assert_eq!(cur.user_id.as_str(), "s2");
        });
        assert_eq!(second, Some(Some(Identity::new("s1", Role::Student))));
        assert_eq!(ch.role(), Some(Role::Student));
    }

    #[test]
    fn close_reports_previous_state_once() {
        let (ch, _rx) = make_channel(4);
        let _ = ch.bind_with(Identity::new("t1", Role::Teacher), |_, _| {});
        let mut calls = 0;
        let first = ch.close_with(|_| calls += 1);
        let second = ch.close_with(|_| calls += 1);
        assert_eq!(first, Some(ChannelState::Authenticated(Identity::new("t1", Role::Teacher))));
        assert_eq!(second, None);
        assert_eq!(calls, 1);
        assert!(ch.close_token().is_cancelled());
    }

    #[test]
    fn bind_after_close_is_refused() {
        let (ch, _rx) = make_channel(4);
        let _ = ch.close_with(|_| {});
        let mut called = false;
        assert_eq!(
            ch.bind_with(Identity::new("s1", Role::Student), |_, _| called = true),
            None
        );
        assert!(!called);
        assert!(ch.is_closed());
    }

    #[tokio::test]
    async fn send_text_and_ping() {
        let (ch, mut rx) = make_channel(4);
        ch.send_text(Arc::new("hello".into())).unwrap();
        ch.send_ping().unwrap();
        assert_eq!(rx.recv().await.unwrap(), Outbound::Text(Arc::new("hello".into())));
        assert_eq!(rx.recv().await.unwrap(), Outbound::Ping);
    }

    #[test]
    fn full_queue_drops() {
        let (ch, _rx) = make_channel(1);
        ch.send_text(Arc::new("a".into())).unwrap();
        assert_eq!(ch.send_text(Arc::new("b".into())), Err(SendError::Full));
        assert_eq!(ch.drop_count(), 1);
    }

    #[test]
    fn closed_channel_refuses_sends() {
        let (ch, _rx) = make_channel(4);
        let _ = ch.close_with(|_| {});
        assert_eq!(ch.send_ping(), Err(SendError::Closed));
        assert_eq!(ch.drop_count(), 0);
    }

    #[test]
    fn dropped_receiver_counts_as_closed() {
        let (ch, rx) = make_channel(4);
        drop(rx);
        assert_eq!(ch.send_text(Arc::new("x".into())), Err(SendError::Closed));
        assert_eq!(ch.drop_count(), 1);
    }

    #[test]
    fn mark_alive_resets_flag() {
        let (ch, _rx) = make_channel(4);
        assert!(ch.check_alive());
        ch.mark_alive();
        assert!(ch.check_alive());
        assert!(ch.last_pong_elapsed() < Duration::from_secs(5));
        assert!(ch.age() < Duration::from_secs(5));
    }
}
