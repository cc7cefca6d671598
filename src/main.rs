//! surface-input - monitor conditioned control-surface input
//!
//! Opens the configured MIDI input port, or replays a hex dump, and prints
//! every message as the consumer would receive it.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use surface_input::config::{AppConfig, MappingWatcher};
use surface_input::mapping::MappingTable;
use surface_input::monitor::{self, Monitor};
use surface_input::Device;

/// Decode and condition control-surface input
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "surface.yaml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Replay a hex dump instead of listening on the input port
    #[arg(long)]
    replay: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Configuration file: {}", args.config.display());
    let config = AppConfig::load(&args.config).await?;

    if let Some(dump) = &args.replay {
        let table = MappingTable::load(&config.mapping).await?;
        let device = Device::new(device_name(&config, "replay"), Arc::new(table));
        return monitor::replay_file(&device, dump).await;
    }

    let (watcher, table) = if config.hot_reload {
        let (watcher, table) = MappingWatcher::new(&config.mapping).await?;
        (Some(watcher), table)
    } else {
        (None, Arc::new(MappingTable::load(&config.mapping).await?))
    };

    let mut monitor = Monitor::new();
    let port_name = monitor.connect(&config.midi.input_port)?;
    let device = Arc::new(Device::new(device_name(&config, &port_name), table));
    info!("Device '{}' ready", device.name());

    monitor.run(device, watcher, shutdown_signal()).await?;

    info!("surface-input shutdown complete");
    Ok(())
}

fn device_name(config: &AppConfig, fallback: &str) -> String {
    config
        .midi
        .device_name
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
