pub mod control;
pub mod macros;


use std::{error::Error, path::PathBuf};

use clap::{Parser, Subcommand};
use control::{handle_control, handle_status};
use macros::{handle_macros, MacrosCommand};
use zbus::{names::BusName, Connection};

use crate::{
    config::{BridgeConfig, BusKind},
    constants::BUS_NAME,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the config file
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the padrelay daemon (default)
    Run,
    /// Manage saved macros
    Macros {
        /// Macro directory to use instead of the configured one
        #[arg(long)]
        dir: Option<PathBuf>,
        #[command(subcommand)]
        cmd: MacrosCommand,
    },
    /// Show the state of the running daemon
    Status,
    /// Send a command to the running daemon (e.g. "SELECT_SLOT 2")
    Control {
        /// Command name (e.g. "PLAY_MACRO")
        name: String,
        /// JSON payload for commands that take one (e.g. '[3, "jump"]')
        payload: Option<String>,
    },
}

pub async fn main_cli(config: &BridgeConfig, cmd: Commands) -> Result<(), Box<dyn Error>> {
    match cmd {
        Commands::Run => (),
        Commands::Macros { dir, cmd } => {
            let dir = dir.unwrap_or_else(|| config.macros_dir());
            handle_macros(dir, cmd)?;
        }
        Commands::Status => {
            let connection = connect(config.dbus).await?;
            handle_status(connection).await?;
        }
        Commands::Control { name, payload } => {
            let connection = connect(config.dbus).await?;
            handle_control(connection, name, payload).await?;
        }
    }

    Ok(())
}

/// Connect to the bus the daemon is configured for and make sure it is
/// running there
async fn connect(bus: BusKind) -> Result<Connection, Box<dyn Error>> {
    let connection = match bus {
        BusKind::System => Connection::system().await?,
        BusKind::Session => Connection::session().await?,
    };
    if !is_running(&connection).await {
        return Err("padrelay daemon is not currently running".into());
    }
    Ok(connection)
}

/// Returns true if padrelay is currently running
async fn is_running(conn: &Connection) -> bool {
    let Ok(bus) = BusName::try_from(BUS_NAME) else {
        return false;
    };
    let dbus = zbus::fdo::DBusProxy::new(conn).await.ok();
    let Some(dbus) = dbus else {
        return false;
    };
    dbus.name_has_owner(bus).await.unwrap_or_default()
}
