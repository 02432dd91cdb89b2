//! codhub-reconcile - staging reconciliation service
//!
//! Serves the sync HTTP API (default), or runs one tenant reconciliation
//! from the command line and prints its summary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use codhub_common::config::{
    database_path, default_config_path, load_toml_config_or_default, resolve_root_folder,
};
use codhub_common::db::init::init_database;
use codhub_common::events::EventBus;
use codhub_reconcile::config::SyncLimits;
use codhub_reconcile::services::SyncOrchestrator;
use codhub_reconcile::AppState;

/// Command-line arguments for codhub-reconcile
#[derive(Parser, Debug)]
#[command(name = "codhub-reconcile")]
#[command(about = "Staging reconciliation service for CODHub")]
#[command(version)]
struct Cli {
    /// Root folder holding the database
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// TOML config file (defaults to ~/.config/codhub/codhub-reconcile.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API (default)
    Serve {
        /// Bind address, overrides `[http] bind`
        #[arg(long)]
        bind: Option<String>,
    },
    /// Reconcile one tenant now and print the summary as JSON
    Reconcile {
        #[arg(long)]
        user: i64,

        /// Continue the tenant's active run instead of being refused
        #[arg(long)]
        continuation: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(|| default_config_path("codhub-reconcile"));
    let toml_config = load_toml_config_or_default(config_path.as_deref());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml_config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting codhub-reconcile v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = resolve_root_folder(cli.root_folder.as_deref(), &toml_config);
    let db_path = database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let db = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let limits = SyncLimits::resolve(&db, &toml_config)
        .await
        .context("Failed to resolve sync limits")?;
    info!(?limits, "Sync limits resolved");

    let event_bus = EventBus::new(256);
    let orchestrator = Arc::new(SyncOrchestrator::new(db.clone(), event_bus.clone(), limits));
    orchestrator
        .progress_store()
        .cleanup_interrupted()
        .await
        .context("Failed to clean up interrupted sessions")?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| toml_config.http.bind.clone());
            let state = AppState::with_orchestrator(db, event_bus, orchestrator);
            let app = codhub_reconcile::build_router(state);

            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .with_context(|| format!("Failed to bind to {}", bind))?;
            info!("Listening on http://{}", bind);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("Server error")?;
            info!("Server shutdown complete");
        }
        Command::Reconcile { user, continuation } => {
            let summary = orchestrator
                .reconcile(user, continuation)
                .await
                .with_context(|| format!("Reconciliation failed for user {}", user))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
