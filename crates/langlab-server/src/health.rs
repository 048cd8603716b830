//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered channels, anonymous included.
    pub connections: usize,
    /// Channels with a bound identity.
    pub authenticated: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, authenticated: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        authenticated,
    }
}
