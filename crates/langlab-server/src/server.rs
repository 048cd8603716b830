//! `LabServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use langlab_auth::TokenVerifier;
use langlab_core::UserId;
use langlab_presence::{PresenceRecord, PresenceStore, PresenceStoreError};
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::hub::Hub;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::liveness::LivenessMonitor;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Coordination state.
    pub hub: Arc<Hub>,
    /// Presence store, for the read-only presence endpoints.
    pub store: Arc<dyn PresenceStore>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus renderer.
    pub metrics: PrometheusHandle,
    /// When the server started.
    pub start_time: Instant,
    /// Largest accepted inbound message.
    pub max_message_size: usize,
}

/// Errors returned by the HTTP endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No presence record for this user.
    #[error("no presence record for {0}")]
    NotFound(UserId),
    /// The presence store failed.
    #[error("presence store unavailable: {0}")]
    Store(#[from] PresenceStoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(error) => {
                warn!(error = %error, "presence query failed");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// The language lab coordination server.
pub struct LabServer {
    config: ServerConfig,
    hub: Arc<Hub>,
    store: Arc<dyn PresenceStore>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl LabServer {
    /// Create a server writing presence to `store` and verifying channel
    /// tokens with `verifier`.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn PresenceStore>,
        verifier: Arc<dyn TokenVerifier>,
        metrics: PrometheusHandle,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.send_queue_capacity));
        let hub = Arc::new(Hub::new(
            registry,
            Arc::clone(&store),
            verifier,
            config.invalid_token_policy,
        ));
        Self {
            config,
            hub,
            store,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            store: Arc::clone(&self.store),
            shutdown: Arc::clone(&self.shutdown),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/presence", get(presence_list_handler))
            .route("/presence/{user_id}", get(presence_get_handler))
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %error, "server stopped with error");
            }
        });
        info!(%addr, "listening");
        Ok((addr, handle))
    }

    /// Start the liveness monitor; it stops on shutdown.
    pub fn spawn_liveness(&self) -> JoinHandle<()> {
        let monitor = LivenessMonitor::new(Arc::clone(&self.hub), self.config.liveness_interval);
        tokio::spawn(monitor.run(self.shutdown.token()))
    }

    /// Stop accepting, close every channel through the normal close path,
    /// wait for `handles`, then flush pending presence writes.
    pub async fn shutdown_gracefully(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        self.shutdown.graceful_shutdown(&self.hub, handles, timeout).await;
    }

    /// Coordination state.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.hub.registry();
    Json(health::health_check(
        state.start_time,
        registry.len(),
        registry.authenticated_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.render()
}

/// GET /presence
async fn presence_list_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<PresenceRecord>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

/// GET /presence/{user_id}
async fn presence_get_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PresenceRecord>, ApiError> {
    let user_id = UserId::new(user_id);
    let record = state.store.get(&user_id).await?;
    record.map(Json).ok_or(ApiError::NotFound(user_id))
}

/// GET / and GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let hub = state.hub;
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            let (channel, outbound) = hub.open_channel();
            run_ws_session(socket, hub, channel, outbound).await;
        })
}
