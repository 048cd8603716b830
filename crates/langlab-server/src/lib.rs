//! # langlab-server
//!
//! Real-time presence and broadcast coordination over WebSocket.
//!
//! - [`websocket::registry`]: live channels keyed by [`ChannelHandle`](langlab_core::ChannelHandle)
//! - [`websocket::handler`]: per-channel state machine (auth, broadcast)
//! - [`websocket::liveness`]: ping/pong eviction of dead channels
//! - [`websocket::presence`]: durable online/offline status with per-user ordering
//! - [`websocket::broadcast`]: lesson fan-out to every connected peer
//! - [`server`]: Axum routes (`/` and `/ws`, `/health`, `/metrics`, `/presence`)
//! - Graceful shutdown via [`shutdown::ShutdownCoordinator`]

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::ServerConfig;
pub use hub::{CloseReason, Hub};
pub use server::LabServer;
