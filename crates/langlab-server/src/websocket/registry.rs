//! Connection registry: the set of live channels keyed by handle.
//!
//! Iteration always snapshots membership under the read lock and then acts
//! with no lock held, so callbacks may send, close or unregister freely.
//! A snapshot may include channels closed in the meantime; check
//! [`Channel::is_closed`] or rely on sends failing.

use std::collections::HashMap;
use std::sync::Arc;

use langlab_core::{ChannelHandle, Identity, Role};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;

use super::channel::{Channel, ChannelState, Outbound};

/// Errors from registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No channel with this handle is registered.
    #[error("unknown channel {0}")]
    UnknownHandle(ChannelHandle),
    /// The channel was closed before the operation took effect.
    #[error("channel {0} is closed")]
    Closed(ChannelHandle),
}

/// Which channels an iteration visits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleFilter {
    /// Every channel, anonymous ones included.
    Any,
    /// Authenticated channels bound with this role.
    Role(Role),
}

impl RoleFilter {
    fn matches(self, channel: &Channel) -> bool {
        match self {
            Self::Any => true,
            Self::Role(role) => channel.role() == Some(role),
        }
    }
}

/// Live channels.
pub struct ConnectionRegistry {
    channels: RwLock<HashMap<ChannelHandle, Arc<Channel>>>,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    /// Registry whose channels get outbound queues of `queue_capacity`.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Add a new anonymous channel. Returns it with the receiving end of
    /// its outbound queue.
    pub fn register(&self) -> (Arc<Channel>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let channel = Arc::new(Channel::new(ChannelHandle::next(), tx));
        let _ = self
            .channels
            .write()
            .insert(channel.handle(), Arc::clone(&channel));
        (channel, rx)
    }

    /// Bind `identity` to `handle`, overwriting any prior identity.
    ///
    /// Returns the previously bound identity.
    pub fn bind(&self, handle: ChannelHandle, identity: Identity) -> Result<Option<Identity>, RegistryError> {
        self.bind_with(handle, identity, |_, _| {})
    }

    /// [`bind`](Self::bind), running `on_bound` under the channel's state
    /// lock so it is ordered against a concurrent close. `on_bound` must
    /// not block.
    pub fn bind_with(
        &self,
        handle: ChannelHandle,
        identity: Identity,
        on_bound: impl FnOnce(Option<&Identity>, &Identity),
    ) -> Result<Option<Identity>, RegistryError> {
        let channel = self.get(handle).ok_or(RegistryError::UnknownHandle(handle))?;
        channel
            .bind_with(identity, on_bound)
            .ok_or(RegistryError::Closed(handle))
    }

    /// Close and remove `handle`. Idempotent.
    ///
    /// Only the first caller receives the pre-close state.
    pub fn unregister(&self, handle: ChannelHandle) -> Option<ChannelState> {
        self.unregister_with(handle, |_| {})
    }

    /// [`unregister`](Self::unregister), running `on_closed` under the
    /// channel's state lock for the first caller only.
    pub fn unregister_with(
        &self,
        handle: ChannelHandle,
        on_closed: impl FnOnce(&ChannelState),
    ) -> Option<ChannelState> {
        let channel = self.get(handle)?;
        let previous = channel.close_with(on_closed);
        let _ = self.channels.write().remove(&handle);
        previous
    }

    /// Apply `f` to every channel matching `filter`. Returns how many were
    /// visited.
    pub fn for_each_with_role(&self, filter: RoleFilter, mut f: impl FnMut(&Arc<Channel>)) -> usize {
        let mut visited = 0;
        for channel in self.snapshot() {
            if filter.matches(&channel) {
                f(&channel);
                visited += 1;
            }
        }
        visited
    }

    /// Apply `f` to every channel regardless of binding state.
    pub fn for_each(&self, f: impl FnMut(&Arc<Channel>)) -> usize {
        self.for_each_with_role(RoleFilter::Any, f)
    }

    /// Clones of every registered channel.
    pub fn snapshot(&self) -> Vec<Arc<Channel>> {
        self.channels.read().values().cloned().collect()
    }

    /// Look up a channel.
    pub fn get(&self, handle: ChannelHandle) -> Option<Arc<Channel>> {
        self.channels.read().get(&handle).cloned()
    }

    /// Whether `handle` is registered.
    pub fn contains(&self, handle: ChannelHandle) -> bool {
        self.channels.read().contains_key(&handle)
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Whether no channels are registered.
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// Number of channels with a bound identity.
    pub fn authenticated_count(&self) -> usize {
        self.snapshot()
            .iter()
            .filter(|c| c.identity().is_some())
            .count()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("channels", &self.len())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;

    fn teacher() -> Identity {
        Identity::new("teacher1", Role::Teacher)
    }

    fn student(id: &str) -> Identity {
        Identity::new(id, Role::Student)
    }

    #[test]
    fn register_adds_anonymous_channel() {
        let reg = ConnectionRegistry::new(8);
        let (ch, _rx) = reg.register();
        assert!(reg.contains(ch.handle()));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.authenticated_count(), 0);
        assert_eq!(ch.state(), ChannelState::Open);
    }

    #[test]
    fn bind_overwrites_and_reports_previous() {
        let reg = ConnectionRegistry::new(8);
        let (ch, _rx) = reg.register();
        assert_eq!(reg.bind(ch.handle(), student("s1")), Ok(None));
        assert_eq!(reg.bind(ch.handle(), teacher()), Ok(Some(student("s1"))));
        assert_eq!(ch.identity(), Some(teacher()));
        assert_eq!(reg.authenticated_count(), 1);
    }

    #[test]
    fn same_user_on_two_handles_is_allowed() {
        let reg = ConnectionRegistry::new(8);
        let (a, _ra) = reg.register();
        let (b, _rb) = reg.register();
        reg.bind(a.handle(), student("s1")).unwrap();
        reg.bind(b.handle(), student("s1")).unwrap();
        assert_eq!(reg.authenticated_count(), 2);
    }

    #[test]
    fn bind_unknown_handle_fails() {
        let reg = ConnectionRegistry::new(8);
        let handle = ChannelHandle::next();
        assert_eq!(
            reg.bind(handle, student("s1")),
            Err(RegistryError::UnknownHandle(handle))
        );
    }

    #[test]
    fn no_resurrection_after_unregister() {
        let reg = ConnectionRegistry::new(8);
        let (ch, _rx) = reg.register();
        let handle = ch.handle();
        assert_eq!(reg.unregister(handle), Some(ChannelState::Open));
        assert!(!reg.contains(handle));
        assert!(reg.bind(handle, student("s1")).is_err());
        assert!(!reg.contains(handle));
        assert!(ch.identity().is_none());
    }

    #[test]
    fn bind_on_closed_but_unremoved_channel_fails() {
        let reg = ConnectionRegistry::new(8);
        let (ch, _rx) = reg.register();
        // Closed under the lock, removal not yet done.
        let _ = ch.close_with(|_| {});
        assert_eq!(
            reg.bind(ch.handle(), student("s1")),
            Err(RegistryError::Closed(ch.handle()))
        );
    }

    #[test]
    fn unregister_is_idempotent() {
        let reg = ConnectionRegistry::new(8);
        let (ch, _rx) = reg.register();
        reg.bind(ch.handle(), student("s1")).unwrap();
        let mut offline_calls = 0;
        let first = reg.unregister_with(ch.handle(), |_| offline_calls += 1);
        let second = reg.unregister_with(ch.handle(), |_| offline_calls += 1);
        assert_eq!(first, Some(ChannelState::Authenticated(student("s1"))));
        assert_eq!(second, None);
        assert_eq!(offline_calls, 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn role_filter_selects_bound_role() {
        let reg = ConnectionRegistry::new(8);
        let (t, _rt) = reg.register();
        let (s, _rs) = reg.register();
        let (_anon, _ra) = reg.register();
        reg.bind(t.handle(), teacher()).unwrap();
        reg.bind(s.handle(), student("s1")).unwrap();

        let mut teachers = Vec::new();
        let n = reg.for_each_with_role(RoleFilter::Role(Role::Teacher), |c| teachers.push(c.handle()));
        assert_eq!(n, 1);
        assert_eq!(teachers, vec![t.handle()]);

        assert_eq!(reg.for_each_with_role(RoleFilter::Any, |_| {}), 3);
        assert_eq!(reg.for_each(|_| {}), 3);
    }

    #[test]
    fn callbacks_may_unregister_during_iteration() {
        let reg = ConnectionRegistry::new(8);
        let _keep: Vec<_> = (0..5).map(|_| reg.register()).collect();
        let visited = reg.for_each(|c| {
            let _ = reg.unregister(c.handle());
        });
        assert_eq!(visited, 5);
        assert!(reg.is_empty());
    }

    #[test]
    fn handles_are_never_reused() {
        let reg = ConnectionRegistry::new(8);
        let (a, _ra) = reg.register();
        let _ = reg.unregister(a.handle());
        let (b, _rb) = reg.register();
        assert_ne!(a.handle(), b.handle());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Bind(Identity),
            Unregister,
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                3 => (0..3usize, any::<bool>()).prop_map(|(n, teaches)| {
                    let role = if teaches { Role::Teacher } else { Role::Student };
                    Op::Bind(Identity::new(format!("user{n}"), role))
                }),
                1 => Just(Op::Unregister),
            ]
        }

        proptest! {
            #[test]
            fn closed_handle_never_comes_back(ops in proptest::collection::vec(op(), 1..32)) {
                let reg = ConnectionRegistry::new(4);
                let (ch, _rx) = reg.register();
                let handle = ch.handle();
                let mut bound: Option<Identity> = None;
                let mut closed = false;

                for op in ops {
                    match op {
                        Op::Bind(identity) => {
                            let result = reg.bind(handle, identity.clone());
                            if closed {
                                prop_assert!(result.is_err());
                            } else {
                                prop_assert_eq!(result, Ok(bound.replace(identity)));
                            }
                        }
                        Op::Unregister => {
                            let previous = reg.unregister(handle);
                            if closed {
                                prop_assert_eq!(previous, None);
                            } else {
                                let expected = match bound.take() {
                                    Some(identity) => ChannelState::Authenticated(identity),
                                    None => ChannelState::Open,
                                };
                                prop_assert_eq!(previous, Some(expected));
                                closed = true;
                            }
                        }
                    }
                    prop_assert_eq!(reg.contains(handle), !closed);
                    prop_assert_eq!(ch.is_closed(), closed);
                    prop_assert_eq!(reg.authenticated_count(), usize::from(!closed && bound.is_some()));
                }
            }
        }
    }
}
