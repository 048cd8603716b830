//! # langlab-logging
//!
//! Structured logging with `tracing`.
//!
//! Context such as the channel handle and bound user travels in span
//! fields (`#[instrument]` on the session entry points), so every event
//! emitted while handling a channel carries it.

#![deny(unsafe_code)]

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `level`. With `json` set, each event is
/// a single JSON object per line; otherwise compact text. Subsequent calls
/// are no-ops.
pub fn init_subscriber(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .flatten_event(true);
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact();
        let _ = subscriber.try_init();
    }
}
