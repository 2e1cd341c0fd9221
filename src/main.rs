//! storepulse - store uptime reporting service
//!
//! Computes per-store uptime and downtime over the last hour, day and week,
//! restricted to each store's business hours, and serves the results as
//! asynchronously generated CSV reports.

mod config;
mod db;
mod report;
mod uptime;
mod web;

use config::ServerConfig;
use db::Store;
use report::ReportManager;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("storepulse=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    let settings = cfg.report_settings()?;
    tracing::info!("Starting storepulse on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let summary = db::load_seed_data(&store, &cfg.data_dir)?;
    if summary.performed {
        tracing::info!(
            "Seeded {} observations, {} business hour rules, {} timezones",
            summary.observations.loaded,
            summary.business_hours.loaded,
            summary.timezones.loaded
        );
    }

    let interrupted = store.fail_interrupted_reports()?;
    if interrupted > 0 {
        tracing::warn!("Marked {} interrupted reports as failed", interrupted);
    }

    // Start report manager
    let reports = Arc::new(ReportManager::new(store.clone(), settings));
    reports.start().await?;

    // Start web server
    let server = Server::new(cfg, store, reports.clone());
    server.start(shutdown_signal()).await?;

    reports.stop().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
