use std::path::PathBuf;

use anyhow::Context as _;
use btleplug::api::Manager as _;
use btleplug::platform::Manager;
use clap::Parser;
use log::{error, info};
use tokio::sync::mpsc;

mod config;
mod error;
mod ibeacon;
mod manager;
mod messages;
mod mqtt;
mod proximity;
mod region;
mod scanner;
mod ui;

use crate::error::FindMeError;
use crate::ui::Ui;

/// Watch an iBeacon region and report how close its beacons are.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Skip the [mqtt] section even if it is configured
    #[arg(long)]
    no_mqtt: bool,
}

fn init_logging(default_filter: &str) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    pretty_env_logger::formatted_builder()
        .parse_filters(&filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = match config::AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) if err.is_config_error() => {
            return Err(err).with_context(|| format!("Invalid config {}", cli.config.display()));
        }
        Err(err) => return Err(err.into()),
    };

    info!("Region: {:?}", config.region);

    let mut sinks: Vec<Box<dyn Ui + Send>> = vec![Box::new(ui::ConsoleUi)];
    let mut mqtt_client = None;
    if let Some(mqtt_config) = config.mqtt.as_ref().filter(|_| !cli.no_mqtt) {
        let (client, mut eventloop) = mqtt::MqttClient::new(mqtt_config);
        tokio::task::spawn(async move {
            mqtt::MqttClient::event_loop(&mut eventloop).await;
        });
        sinks.push(Box::new(client.ui(&config.region.identifier)));
        mqtt_client = Some(client);
    }

    let bt_manager = Manager::new().await?;

    // get the first bluetooth adapter
    let central = bt_manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or(FindMeError::AdapterNotFound)?;

    let (tx, rx) = mpsc::channel(32);
    let (scanner, handle) = scanner::Scanner::new(central, &config.ranging(), tx);
    let scanner_task = tokio::task::spawn(scanner.run());

    let core = manager::Manager::new(config.region.clone(), handle, sinks);
    let core = core.run(rx).await;
    info!("Region state at exit: {:?}", core.lifecycle().state());

    // Dropping the manager closes the scanner's command channel.
    drop(core);
    match scanner_task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) if err.is_bluetooth_error() => error!("Scanner stopped: {}", err),
        Ok(Err(err)) => error!("Scanner failed: {:?}", err),
        Err(err) => error!("Scanner task panicked: {:?}", err),
    }
    info!("Exiting manager event loop");

    if let Some(client) = mqtt_client {
        client.disconnect().await?;
    }

    Ok(())
}
