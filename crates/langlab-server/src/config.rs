//! Server configuration.

use std::time::Duration;

use langlab_settings::{InvalidTokenPolicy, LabSettings};

/// Runtime configuration for [`LabServer`](crate::LabServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Largest accepted inbound WebSocket message, in bytes.
    pub max_message_size: usize,
    /// Per-channel outbound queue depth.
    pub send_queue_capacity: usize,
    /// Time between liveness probe cycles.
    pub liveness_interval: Duration,
    /// What to do when a channel presents an invalid token.
    pub invalid_token_policy: InvalidTokenPolicy,
}

impl ServerConfig {
    /// Derive the server configuration from loaded settings.
    pub fn from_settings(settings: &LabSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_message_size: settings.server.max_message_size,
            send_queue_capacity: settings.server.send_queue_capacity,
            liveness_interval: settings.liveness.interval(),
            invalid_token_policy: settings.auth.on_invalid_token,
        }
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    /// Loopback on an ephemeral port; otherwise the settings defaults.
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ..Self::from_settings(&LabSettings::default())
        }
    }
}
