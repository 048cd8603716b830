//! # langlab-core
//!
//! Shared vocabulary for the language lab coordination service.
//!
//! - **IDs**: [`UserId`] (account identity) and [`ChannelHandle`] (opaque
//!   per-connection handle allocated by the registry)
//! - **Roles**: [`Role`] and the bound [`Identity`] pair
//! - **Wire protocol**: [`InboundMessage`] / [`OutboundMessage`] JSON frames
//!   and the transient [`BroadcastMessage`]

#![deny(unsafe_code)]

pub mod ids;
pub mod identity;
pub mod protocol;

pub use identity::{Identity, Role, UnknownRole};
pub use ids::{ChannelHandle, UserId};
pub use protocol::{BroadcastMessage, InboundMessage, OutboundMessage, ProtocolError};
