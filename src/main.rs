use std::env;
use std::error::Error;
use std::time::Duration;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use zbus::Connection;

use crate::bridge::state::publish_changes;
use crate::bridge::{stop_on_signal, Bridge, BridgeError};
use crate::cli::{main_cli, Args, Commands};
use crate::config::{BridgeConfig, BusKind};
use crate::constants::{BUS_NAME, BUS_PATH};
use crate::dbus::interface::bridge::BridgeInterface;
use crate::drivers::procon2::driver::Driver;
use crate::input::target::gamepad::VirtualGamepad;
use crate::macros::controller::MacroController;
use crate::macros::storage::MacroStore;

mod bridge;
mod cli;
mod config;
mod constants;
mod dbus;
mod drivers;
mod input;
mod macros;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let args = Args::parse();

    let log_level = match env::var("LOG_LEVEL") {
        Ok(value) => value,
        Err(_) => "info".to_string(),
    };
    env::set_var("RUST_LOG", log_level);
    env_logger::init();

    let config = BridgeConfig::load(args.config.as_deref())?;

    match args.cmd {
        None | Some(Commands::Run) => run(config).await,
        Some(cmd) => {
            if let Err(e) = main_cli(&config, cmd).await {
                return Err(e.to_string().into());
            }
            Ok(())
        }
    }
}

/// Run the daemon until the controller disconnects or a shutdown signal
/// arrives
async fn run(config: BridgeConfig) -> Result<(), Box<dyn Error + Send + Sync>> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    log::info!("Starting padrelay v{}", VERSION);

    let calibration = config.calibration()?;
    let store = MacroStore::new(config.macros_dir());
    log::info!("Using macro directory {:?}", store.dir());
    let controller = MacroController::new(store.clone());

    // Open the physical controller and create the virtual one
    let driver = match config.device_path.clone() {
        Some(path) => Driver::new(path)?,
        None => Driver::open()?,
    };
    let gamepad = VirtualGamepad::new()?;

    let (tx, rx) = mpsc::unbounded_channel();
    let mut bridge = Bridge::new(driver, gamepad, calibration, controller, rx);
    let state_rx = bridge.subscribe_state();
    let catalog_rx = bridge.subscribe_catalog();
    let stop = bridge.stop_flag();

    // Stop on CTRL+C and on SIGTERM from the service manager
    let mut terminate = signal(SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    };
    tokio::spawn(stop_on_signal(shutdown, stop));

    // Configure the DBus connection
    let connection = match config.dbus {
        BusKind::System => Connection::system().await?,
        BusKind::Session => Connection::session().await?,
    };
    let iface = BridgeInterface::new(tx, state_rx.clone(), store);
    connection.object_server().at(BUS_PATH, iface).await?;
    connection.request_name(BUS_NAME).await?;
    log::info!("Listening on {BUS_NAME} at {BUS_PATH}");

    // Publish state and catalog changes until the bridge goes away
    let interval = Duration::from_millis(config.publish_interval_ms);
    let conn = connection.clone();
    let state_task = tokio::spawn(publish_changes(state_rx, interval, move |state| {
        let conn = conn.clone();
        async move {
            if let Err(e) = BridgeInterface::emit_state(&conn, &state).await {
                log::warn!("Failed to publish state: {e}");
            }
        }
    }));
    let conn = connection.clone();
    let catalog_task = tokio::spawn(publish_changes(catalog_rx, interval, move |_| {
        let conn = conn.clone();
        async move {
            if let Err(e) = BridgeInterface::emit_macros(&conn).await {
                log::warn!("Failed to publish macros: {e}");
            }
        }
    }));

    // The bridge loop blocks on device reads, so it gets its own thread
    let samples = config.center_samples;
    let result = tokio::task::spawn_blocking(move || -> Result<(), BridgeError> {
        bridge.calibrate_centers(samples)?;
        bridge.run()
    })
    .await?;

    if let Err(e) = state_task.await {
        log::warn!("State publisher failed: {e}");
    }
    if let Err(e) = catalog_task.await {
        log::warn!("Catalog publisher failed: {e}");
    }

    result?;
    log::info!("padrelay stopped");

    Ok(())
}
