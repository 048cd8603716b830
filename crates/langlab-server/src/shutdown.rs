//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::hub::{CloseReason, Hub};

/// Default time to wait for tasks and presence writes before giving up.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates graceful shutdown across the server, the liveness monitor
/// and open channels.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Shut down in order:
    ///
    /// 1. Cancel the token (listener stops accepting, liveness loop exits)
    /// 2. Close every channel with [`CloseReason::Shutdown`], recording each
    ///    bound user offline
    /// 3. Wait up to `timeout` for `handles`
    /// 4. Wait up to `timeout` for pending presence writes
    pub async fn graceful_shutdown(
        &self,
        hub: &Hub,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        let closed = hub.close_all(CloseReason::Shutdown);
        info!(
            closed,
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "shutting down"
        );

        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, some tasks may still be running");
        }
        if tokio::time::timeout(timeout, hub.presence().flush()).await.is_err() {
            warn!("presence writes still pending after {timeout:?}");
        }
    }
}
