//! Bingo Sync Server - real-time multi-room bingo board synchronization
//!
//! This is the main entry point for the server. It handles:
//! - WebSocket connections carrying the room and board protocol
//! - A health endpoint for deployment probes
//! - Restoring persisted rooms at startup and evicting idle ones

mod app;
mod config;
mod error;
mod game;
mod http;
mod room;
mod store;
mod user;
mod util;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::room::sweeper::run_idle_sweep;
use crate::store::{Persistence, RoomRepository};
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Bingo Sync Server");
    info!("Server address: {}", config.server_addr);
    info!(backend = ?config.store_backend, "Room storage");

    // Open storage and start the persistence writer
    let repository = Arc::new(RoomRepository::open(&config).await?);
    let records = repository.load_all().await?;
    let (persistence, writer) = Persistence::spawn(repository);

    // Create application state
    let state = AppState::new(config.clone(), persistence.clone());
    state.restore_rooms(records);

    // Spawn idle room eviction
    tokio::spawn(run_idle_sweep(
        state.rooms.clone(),
        persistence.clone(),
        config.room_ttl,
        config.sweep_interval,
    ));

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws?v={}", addr, ws::protocol::PROTOCOL_VERSION);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain pending room writes before exiting
    persistence.flush().await;
    writer.abort();

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
