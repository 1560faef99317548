//! gattbridge - BLE peripheral to TCP bridge daemon

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use gattbridge_cli::{app::BridgeApp, cli::Cli};
use gattbridge_core::BridgeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config_path = cli
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(BridgeConfig::default_path);
    let mut config = BridgeConfig::load_or_default(&config_path);
    info!("Configuration loaded from {:?}", config_path);

    if cli.forget {
        config.ble_name.clear();
        config.ble_mac.clear();
    }
    if let Some(name) = cli.name {
        config.ble_name = name;
    }
    if let Some(mac) = cli.mac {
        config.ble_mac = mac;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }

    let app = BridgeApp::new(config, config_path).await?;
    app.run().await
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
