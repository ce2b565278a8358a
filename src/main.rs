//! Daemon entry point for the wind monitor.
//!
//! Loads and validates configuration, initializes tracing, spawns the
//! service, and runs until interrupted. Shutdown cancels the timers, drains
//! in-flight deliveries, and closes the broker session cleanly so the
//! last-will marker is withdrawn.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use wind_monitor::broker::rumqtt::RumqttConnector;
use wind_monitor::sink::JsonlStore;
use wind_monitor::{MonitorConfig, MonitorError, WindMonitor};

#[derive(Parser)]
#[command(name = "wind-monitor")]
#[command(about = "Wind telemetry service with broker, store, and push-channel fan-out")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config/wind-monitor.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = MonitorConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    config
        .validate()
        .map_err(MonitorError::Configuration)
        .context("invalid configuration")?;

    telemetry_init(&config)?;

    info!(
        name = %config.application.name,
        broker = %config.broker.url,
        interval_secs = config.simulation.interval_secs,
        "starting wind monitor"
    );

    let store = JsonlStore::new(&config.storage);
    let handle = WindMonitor::spawn(config, Box::new(RumqttConnector::new()), Box::new(store));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    handle.shutdown().await;
    Ok(())
}

fn telemetry_init(config: &MonitorConfig) -> anyhow::Result<()> {
    wind_monitor::telemetry::init_from_config(config)
        .map_err(MonitorError::Configuration)
        .context("failed to initialize tracing")
}
