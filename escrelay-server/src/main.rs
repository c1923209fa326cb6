//! Escrow Event Relay Server
//!
//! Accepts signed escrow contract events from chain watchers and relays
//! them to browser clients over server-sent events.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ConfigLoader;
use escrelay_core::broadcast::EventBroadcaster;
use escrelay_core::events::{RecentEvents, event_log_channel};
use escrelay_core::processors::EventRelay;
use server::{build_router, run_server};
use shutdown::{shutdown_signal, spawn_config_reload_handler};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Escrow Event Relay - live escrow contract events over SSE
#[derive(Parser, Debug)]
#[command(name = "escrelay-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "ESCRELAY_CONFIG", default_value = "./escrelay.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Shared secret for signed event ingestion (overrides [ingest] secret)
    #[arg(long, env = "ESCRELAY_INGEST_SECRET", hide_env_values = true)]
    ingest_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting escrelay-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(
        &args.config,
        args.listen,
        args.ingest_secret,
    ));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let broadcaster = EventBroadcaster::new(&loaded_config.stream);

    // Convert to shared config with separate locks for each section
    let shared_config = loaded_config.into_shared();

    // Wire the ingestion channel into the relay
    let (event_tx, event_rx) = event_log_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = EventRelay::new(broadcaster.clone());
    let relay_handle = tokio::spawn(relay.run(shutdown_rx.clone(), event_rx));

    // Create application state
    let state = AppState::new(
        shared_config,
        broadcaster,
        event_tx,
        RecentEvents::default(),
        shutdown_rx,
    );

    // Spawn config reload handler (listens for SIGHUP)
    let shutdown_notify = spawn_config_reload_handler(state.clone(), config_loader);

    // Build the router
    let router = build_router(state);

    // Run the server. Open event streams end as soon as the watch flips,
    // so graceful shutdown is not held up by idle subscribers.
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr, async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    })
    .await;

    // Signal the config reload handler to stop
    shutdown_notify.notify_one();

    // Let the relay flush accepted events
    if let Err(e) = relay_handle.await {
        tracing::error!("EventRelay task failed: {}", e);
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
