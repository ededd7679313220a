//! Newsletter Studio - Main Entry Point
//!
//! Serves the composer UI's API:
//! 1. Draft and settings persistence
//! 2. BotHelp connection check and test sends
//! 3. Image uploads and send history

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsletter_studio::config::ServerConfig;
use newsletter_studio::server::{self, AppState};
use newsletter_studio::storage::StudioStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,newsletter_studio=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Newsletter Studio starting...");

    // Load configuration
    let config = ServerConfig::from_env()?;
    info!("📋 Configuration loaded");

    let store = StudioStore::new(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;
    info!("📦 Storage initialized at {:?}", config.database_path);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.listen_addr))?;

    let state = AppState::new(config, Arc::new(store))?;

    let http_server = tokio::spawn(async move {
        if let Err(e) = server::run_server(addr, state).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    info!("🌐 Server listening on http://{}", addr);

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => info!("📢 Shutdown signal received"),
        Err(err) => tracing::error!("Unable to listen for shutdown signal: {}", err),
    }

    info!("🛑 Shutting down server...");
    http_server.abort();

    info!("✅ Newsletter Studio stopped");
    Ok(())
}
