//! # langlab
//!
//! Language lab coordination server binary: loads settings, opens the
//! presence database and serves the channel endpoint until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use langlab_auth::JwtVerifier;
use langlab_presence::{ConnectionConfig, PresenceStore, SqlitePresenceStore};
use langlab_server::{LabServer, ServerConfig};
use langlab_settings::{LabSettings, LogFormat};

/// How long shutdown waits for sessions and presence writes.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Language lab coordination server.
#[derive(Parser, Debug)]
#[command(name = "langlab", about = "Language lab coordination server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the presence `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Settings file (defaults to `~/.langlab/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut LabSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }

    /// Absolute presence database path.
    fn db_path(&self, settings: &LabSettings) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            settings
                .presence
                .resolve_db_path(&langlab_settings::loader::settings_dir())
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings first: the log level comes from them.
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(langlab_settings::loader::settings_path);
    let mut settings = langlab_settings::loader::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    cli.apply(&mut settings);

    langlab_logging::init_subscriber(
        &settings.logging.level,
        settings.logging.format == LogFormat::Json,
    );

    let db_path = cli.db_path(&settings);
    let pool = langlab_presence::new_file(&db_path, &ConnectionConfig::default())
        .with_context(|| format!("Failed to open presence database {}", db_path.display()))?;
    let store = Arc::new(SqlitePresenceStore::open(pool).context("Failed to migrate presence database")?);

    // Nobody is connected to a process that just started.
    let reset = store
        .mark_all_offline(chrono::Utc::now())
        .await
        .context("Failed to reset presence")?;
    tracing::info!(path = %db_path.display(), reset, "presence database ready");

    let metrics = langlab_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let verifier = Arc::new(JwtVerifier::new(&settings.auth.jwt_secret));
    let server = LabServer::new(ServerConfig::from_settings(&settings), store, verifier, metrics);

    let (addr, serve_handle) = server
        .listen()
        .await
        .context("Failed to bind listener")?;
    let liveness_handle = server.spawn_liveness();
    tracing::info!(%addr, ws = %format!("ws://{addr}/ws"), "langlab server started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("received Ctrl-C, shutting down");

    server
        .shutdown_gracefully(vec![serve_handle, liveness_handle], Some(SHUTDOWN_TIMEOUT))
        .await;
    tracing::info!("shutdown complete");
    Ok(())
}
