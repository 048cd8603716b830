//! Settings type definitions.
//!
//! All types use camelCase JSON and `#[serde(default)]`, so a partial
//! settings file only needs the keys it overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 4000 },
///   "liveness": { "intervalMs": 30000 },
///   "auth": { "onInvalidToken": "close" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabSettings {
    /// HTTP / WebSocket listener settings.
    pub server: ServerSettings,
    /// Ping/pong liveness monitoring.
    pub liveness: LivenessSettings,
    /// Token verification.
    pub auth: AuthSettings,
    /// Durable presence store.
    pub presence: PresenceSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl LabSettings {
    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.liveness.interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "liveness.intervalMs must be greater than zero".into(),
            ));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be greater than zero".into(),
            ));
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(SettingsError::InvalidValue("auth.jwtSecret must not be empty".into()));
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Largest accepted inbound WebSocket message, in bytes.
    pub max_message_size: usize,
    /// Outbound queue depth per channel before messages are dropped.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            max_message_size: 64 * 1024,
            send_queue_capacity: 256,
        }
    }
}

/// Liveness monitor settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LivenessSettings {
    /// Time between probe cycles, in milliseconds.
    pub interval_ms: u64,
}

impl LivenessSettings {
    /// Probe interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self { interval_ms: 30_000 }
    }
}

/// What to do with a channel that presents an invalid token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidTokenPolicy {
    /// Drop the message; the channel stays open and unauthenticated.
    #[default]
    Ignore,
    /// Close the channel.
    Close,
}

/// Token verification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HMAC secret shared with the login endpoint.
    pub jwt_secret: String,
    /// Invalid token handling.
    pub on_invalid_token: InvalidTokenPolicy,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "replace-me-very-secret".to_string(),
            on_invalid_token: InvalidTokenPolicy::Ignore,
        }
    }
}

/// Presence store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresenceSettings {
    /// `SQLite` file; relative paths resolve against `~/.langlab`.
    pub db_path: String,
}

impl PresenceSettings {
    /// Absolute database path.
    pub fn resolve_db_path(&self, base: &Path) -> PathBuf {
        let path = Path::new(&self.db_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            db_path: "presence.db".to_string(),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single line.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
