//! Progress Tracker (lumo-pt) - Main entry point
//!
//! This is the playback-progress microservice for Lumo. It tracks one
//! playback session at a time against a curriculum of video content,
//! persisting positions locally every tick and remotely on a throttled
//! cadence, and serves the HTTP/SSE control interface for the browser
//! client.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lumo_pt::api;
use lumo_pt::cache::SqlitePositionCache;
use lumo_pt::curriculum::SqliteCurriculumStore;
use lumo_pt::player::ReportedPlayer;
use lumo_pt::remote::HttpProgressStore;
use lumo_pt::state::SharedState;
use lumo_pt::tracker::{TrackerConfig, TrackerEngine};

/// Command-line arguments for lumo-pt
#[derive(Parser, Debug)]
#[command(name = "lumo-pt")]
#[command(about = "Progress Tracker microservice for Lumo")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5810", env = "LUMO_PT_PORT")]
    port: u16,

    /// Data folder holding the local database
    #[arg(short, long, env = "LUMO_DATA_FOLDER")]
    data_folder: Option<String>,

    /// Remote progress service base URL
    #[arg(long, env = "LUMO_REMOTE_URL")]
    remote_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lumo_pt=debug,lumo_common=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    info!("Starting Lumo Progress Tracker on port {}", args.port);

    let data_folder = lumo_common::config::resolve_data_folder(
        args.data_folder.as_deref(),
        "LUMO_DATA_FOLDER",
    )
    .context("Failed to resolve data folder")?;
    info!("Data folder: {}", data_folder.display());

    let db_pool = lumo_common::db::init_database(&data_folder.join("lumo.db"))
        .await
        .context("Failed to initialize database")?;

    let config = TrackerConfig::load(&db_pool)
        .await
        .context("Failed to load tracker settings")?;
    info!(
        "Tracker settings: tick={}ms, remote_interval={}s, advance_delay={}ms, user={}",
        config.tick_interval_ms,
        config.remote_write_interval_s,
        config.advance_delay_ms,
        config.user_id
    );

    let remote_url =
        lumo_common::config::resolve_remote_url(args.remote_url.as_deref(), "LUMO_REMOTE_URL");
    info!("Remote progress store: {}", remote_url);
    let remote =
        Arc::new(HttpProgressStore::new(remote_url).context("Failed to build remote client")?);

    // Composition root: the tracker receives its collaborators, it does
    // not construct them
    let player = ReportedPlayer::new();
    let engine = Arc::new(TrackerEngine::new(
        Arc::new(SharedState::new()),
        player.clone(),
        Arc::new(SqlitePositionCache::new(db_pool.clone())),
        remote,
        Arc::new(SqliteCurriculumStore::new(db_pool.clone())),
        config,
    ));
    info!("Tracker engine initialized");

    // Build the application router
    let app_state = api::AppState {
        engine: engine.clone(),
        player,
        port: args.port,
    };

    let app = api::create_router(app_state);

    // Create socket address
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Final flush before exit
    engine.detach().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
