pub mod bridge;
pub mod config;
pub mod lock;
pub mod mqtt;
pub mod network;
#[cfg(test)]
mod testing;
pub mod watchdog;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::bridge::{Bridge, BridgeError};
use crate::config::Config;
use crate::lock::engine::NukiLock;
use crate::lock::simulated::SimulatedLock;
use crate::mqtt::client::RumqttBroker;
use crate::mqtt::discovery::DiscoveryInfo;
use crate::mqtt::mqtt_handler::MqttHandler;
use crate::watchdog::ConnectivityWatchdog;

/// Exit code for a network that stayed down past the timeout; the service
/// manager restarts the process.
const EXIT_NETWORK_TIMEOUT: i32 = 75;

const REMOVE_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "nukihub", version, about = "Bridges a Nuki smart lock to an MQTT broker")]
struct Cli {
    /// Settings file, defaults to ~/.config/nukihub/config.toml
    #[arg(short, long, env = "NUKIHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Clear the retained discovery documents and exit
    #[arg(long)]
    remove_discovery: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;
    let cli = Cli::parse();

    let path = cli.config.unwrap_or_else(config::default_path);
    info!("Loading settings from {}", path.display());
    let settings = Config::load_or_init(&path)
        .await
        .map_err(|e| eyre!("Failed to load settings: {}", e))?;

    let mut bridge = build_bridge(&settings)
        .map_err(|e| eyre!("{} (check {})", e, path.display()))?;

    if cli.remove_discovery {
        return run_on_worker(move || bridge.remove_discovery(REMOVE_DISCOVERY_TIMEOUT))
            .await?
            .map_err(|e| eyre!("Failed to remove discovery: {}", e));
    }

    // Ctrl-C beendet die Schleife sauber
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal_cancel.cancel();
            }
            Err(e) => error!("Unable to listen for shutdown signal: {}", e),
        }
    });

    match run_on_worker(move || bridge.run(cancel)).await? {
        Ok(()) => Ok(()),
        Err(e @ BridgeError::NetworkTimeout { .. }) => {
            error!("{}, exiting for restart", e);
            std::process::exit(EXIT_NETWORK_TIMEOUT);
        }
    }
}

fn build_bridge(settings: &Config) -> Result<Bridge> {
    // Broker und Netzwerk
    let broker = RumqttBroker::new(
        Duration::from_millis(settings.mqtt.connect_timeout_ms),
        Duration::from_millis(settings.mqtt.poll_timeout_ms),
    );
    let mut handler = MqttHandler::new(
        Box::new(broker),
        network::create_device(&settings.network),
        settings.hostname.clone(),
    );
    handler
        .configure(settings.mqtt.clone())
        .map_err(|e| eyre!("Invalid MQTT settings: {}", e))?;
    if let Err(e) = handler.initialize_network() {
        warn!("Network device not ready: {}", e);
    }

    let discovery = (!settings.mqtt.discovery_topic.is_empty()).then(|| {
        DiscoveryInfo::smart_lock(
            handler.namespace(),
            &settings.lock.name,
            &settings.lock.device_id,
        )
    });

    // Lock initialisieren
    warn!("No radio backend available, using simulated lock");
    let engine = NukiLock::create(
        Box::new(SimulatedLock::new()),
        Some(settings.lock.settings()),
    );
    let watchdog = ConnectivityWatchdog::new(settings.network.timeout_secs, Instant::now());

    Ok(Bridge::new(handler, engine, watchdog, discovery))
}

/// Runs `f` on a dedicated thread. The broker client blocks and must stay off
/// the runtime's worker threads.
async fn run_on_worker<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let handle = std::thread::Builder::new()
        .name("bridge".to_string())
        .spawn(f)
        .map_err(|e| eyre!("Failed to spawn bridge thread: {}", e))?;

    tokio::task::spawn_blocking(move || handle.join())
        .await
        .map_err(|e| eyre!("Failed to join bridge thread: {}", e))?
        .map_err(|_| eyre!("Bridge thread panicked"))
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
