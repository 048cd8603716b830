//! Channel registry, per-channel session, liveness, presence and broadcast.

pub mod broadcast;
pub mod channel;
pub mod handler;
pub mod liveness;
pub mod presence;
pub mod registry;
pub mod session;
