//! wildgen - Weighted random workflow generator for ComfyUI
//!
//! The generator runs unattended:
//! - Indexes checkpoints and LoRAs per category from the filesystem
//! - Picks a base model, a character and auxiliary overlays by weight
//! - Resolves a workflow template and composes its prompt tags
//! - Submits the result to ComfyUI and repeats
//! - Follows edits to data files and assets while running

mod application;
mod domain;
mod infrastructure;

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::infrastructure::config::AppConfig;
use crate::infrastructure::generation_worker::generation_worker;
use crate::infrastructure::state::AppState;
use crate::infrastructure::watcher::FileWatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wildgen=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting wildgen");

    // Load configuration
    let mut config = AppConfig::from_env()?;
    if let Ok(canonical) = std::fs::canonicalize(&config.settings_file) {
        config.settings_file = canonical;
    }
    tracing::info!("Configuration loaded");
    tracing::info!("  Settings: {}", config.settings_file.display());
    tracing::info!("  ComfyUI: {}", config.comfyui_base_url);
    tracing::info!("  Database: {}", config.database_url);

    // Initialize application state
    let state = AppState::new(config).await?;
    let state = Arc::new(state);
    tracing::info!(categories = ?state.registry.categories(), "Application state initialized");

    if state.settings.submit_prompt {
        match state.comfyui_client.health_check().await {
            Ok(true) => tracing::info!("ComfyUI is reachable"),
            Ok(false) | Err(_) => tracing::warn!("ComfyUI did not answer the health check"),
        }
    }

    // Start watching data files and assets
    let (_watcher, events) = FileWatcher::start(&state.change_router().watched_paths())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut worker = {
        let state = state.clone();
        tokio::spawn(async move {
            generation_worker(state, events, shutdown_rx).await;
        })
    };

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        result = &mut worker => {
            if let Err(e) = result {
                tracing::error!("Generation worker error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, finishing the current iteration...");
            shutdown_tx.send(true).ok();
            if let Err(e) = worker.await {
                tracing::error!("Generation worker error: {}", e);
            }
            tracing::info!("Worker stopped");
        }
    }

    Ok(())
}
