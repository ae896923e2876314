//! Watchpost Agent - Main Entry Point
//!
//! Counts keyword hits in the local input stream and periodically reports a
//! risk score to the collector. Only counters leave the machine, never text.

mod logic;
pub mod constants;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;

use logic::capture::{self, CaptureSource};
use logic::cloud_sync::{CloudClient, CloudConfig, DeliveryAgent, SyncConfig};
use logic::counters::CounterStore;
use logic::keywords::KeywordMatcher;
use logic::subject::ProcessProbe;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    log::info!("Starting {} v{}...", constants::APP_NAME, constants::APP_VERSION);

    let store = Arc::new(CounterStore::new());

    // Capture listener (dedicated OS thread)
    let matcher = KeywordMatcher::new(constants::get_flagged_keywords());
    let source = CaptureSource::parse(&constants::get_capture_source());
    let capture = match capture::spawn_listener(source, matcher, Arc::clone(&store)) {
        Ok(handle) => handle,
        Err(e) => {
            // Keep delivering zero-flag reports
            log::error!("Input capture unavailable: {}", e);
            None
        }
    };

    // Delivery loop
    let cloud_config = CloudConfig::default();
    log::info!("🌐 Collector: {}", cloud_config.server_url);
    let client = CloudClient::new(cloud_config).context("Failed to create collector client")?;

    let agent = DeliveryAgent::new(
        SyncConfig::default(),
        Arc::new(client),
        Arc::clone(&store),
        Arc::new(ProcessProbe::new()),
    );
    let status = agent.status_handle();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let delivery = tokio::spawn(agent.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    log::info!("Shutdown requested");

    shutdown_tx.send(true).ok();
    if let Err(e) = delivery.await {
        log::error!("Delivery task failed: {}", e);
    }

    if let Some(handle) = capture {
        tokio::task::spawn_blocking(move || handle.shutdown(Duration::from_millis(500)))
            .await
            .ok();
    }

    let status = status.read().clone();
    match serde_json::to_string(&status) {
        Ok(json) => log::info!("Final sync status: {}", json),
        Err(e) => log::debug!("Cannot serialize sync status: {}", e),
    }
    let pending = store.snapshot_and_hold();
    if !pending.is_empty() {
        log::info!("{} undelivered events dropped at exit", pending.total);
    }

    Ok(())
}
