//! Segue Player - Main entry point
//!
//! Sequential media playback service: per-session persisted FIFO queues,
//! one active stream per session, automatic advancement on finish, and a
//! REST/SSE control surface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use segue_common::events::EventBus;
use segue_player::api::{create_router, AppContext};
use segue_player::config::{Config, ConfigOverrides};
use segue_player::db;
use segue_player::db::queue_store::QueueStore;
use segue_player::notify::EventBusSink;
use segue_player::session::registry::SessionRegistry;
use segue_player::transport::{HttpMediaResolver, SimTransport};

/// Command-line arguments for segue-player
#[derive(Parser, Debug)]
#[command(name = "segue-player")]
#[command(about = "Sequential media playback service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SEGUE_PORT")]
    port: Option<u16>,

    /// Path to the SQLite database file
    #[arg(short, long, env = "SEGUE_DATABASE")]
    database: Option<PathBuf>,

    /// Path to a TOML configuration file
    #[arg(short, long, env = "SEGUE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(
        args.config.as_deref(),
        ConfigOverrides {
            database_path: args.database,
            port: args.port,
        },
    )
    .await
    .context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("segue_player={},tower_http=debug", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Segue Player on port {}", config.port);
    info!("Database: {}", config.database_path.display());

    let pool = db::connect(&config.database_path)
        .await
        .context("Failed to open database")?;
    db::init::initialize_database(&pool)
        .await
        .context("Failed to initialize database")?;
    let store = QueueStore::new(pool);

    let bus = EventBus::new(100);
    let sink = Arc::new(EventBusSink::new(bus.clone()));

    // Demo transport: streams complete on their own as if the media had run
    // its course. Swap for a real backend integration to move actual audio.
    let transport = Arc::new(SimTransport::with_auto_complete(Duration::from_secs(30)));
    let resolver = Arc::new(HttpMediaResolver::new().context("Failed to build media resolver")?);

    let registry = Arc::new(SessionRegistry::new(
        store,
        transport,
        resolver,
        sink,
        bus.clone(),
    ));

    let app = create_router(AppContext {
        registry: Arc::clone(&registry),
        bus,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop session actors so held transports are released.
    registry.shutdown_all().await;

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
