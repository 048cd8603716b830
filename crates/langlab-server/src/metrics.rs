//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle that renders the `/metrics` endpoint. Fails if a
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle backed by a recorder that is not installed globally.
///
/// Renders an empty exposition; used when metrics are not wanted (tests,
/// embedded servers).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// WebSocket channels opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Currently registered channels (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Channels closed (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Channel lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Channels evicted by the liveness monitor (counter).
pub const LIVENESS_EVICTIONS_TOTAL: &str = "liveness_evictions_total";
/// Broadcasts routed (counter).
pub const BROADCASTS_TOTAL: &str = "broadcasts_total";
/// Broadcast deliveries dropped on a full or closed queue (counter).
pub const BROADCAST_DROPS_TOTAL: &str = "broadcast_drops_total";
/// Presence store writes that failed (counter, labels: op).
pub const PRESENCE_WRITE_FAILURES_TOTAL: &str = "presence_write_failures_total";
/// Successful channel authentications (counter, labels: role).
pub const AUTH_SUCCESS_TOTAL: &str = "auth_success_total";
/// Rejected channel tokens (counter).
pub const AUTH_FAILURES_TOTAL: &str = "auth_failures_total";
