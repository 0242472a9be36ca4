use std::error::Error;

use tabled::settings::{Panel, Style};
use tabled::{Table, Tabled};
use zbus::Connection;

use crate::bridge::{command::ControlCommand, state::StateSnapshot};
use crate::dbus::interface::bridge::BridgeInterfaceProxy;

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Connected")]
    connected: bool,
    #[tabled(rename = "Macro Mode")]
    macro_mode: bool,
    #[tabled(rename = "Recording")]
    recording: bool,
    #[tabled(rename = "Playing")]
    playing: bool,
    #[tabled(rename = "Slot")]
    slot: String,
    #[tabled(rename = "Macro")]
    name: String,
    #[tabled(rename = "Speed")]
    speed: String,
}

impl From<StateSnapshot> for StateRow {
    fn from(state: StateSnapshot) -> Self {
        let slot = if state.slot_count == 0 {
            "-".to_string()
        } else {
            format!("{}/{}", state.current_slot + 1, state.slot_count)
        };
        Self {
            connected: state.connected,
            macro_mode: state.macro_mode,
            recording: state.recording,
            playing: state.playing,
            slot,
            name: state.current_macro_name.unwrap_or_else(|| "-".to_string()),
            speed: format!("{:.2}x", state.playback_speed),
        }
    }
}

pub async fn handle_status(conn: Connection) -> Result<(), Box<dyn Error>> {
    let bridge = BridgeInterfaceProxy::new(&conn).await?;
    let state: StateSnapshot = serde_json::from_str(&bridge.state().await?)?;

    let mut table = Table::new(vec![StateRow::from(state)]);
    table
        .with(Style::modern_rounded())
        .with(Panel::header("Bridge"));
    println!("{table}");

    Ok(())
}

pub async fn handle_control(
    conn: Connection,
    name: String,
    payload: Option<String>,
) -> Result<(), Box<dyn Error>> {
    // Validate locally first so typos get a useful message
    let value = match payload.as_deref() {
        Some(text) => Some(serde_json::from_str::<serde_json::Value>(text)?),
        None => None,
    };
    if let Err(e) = ControlCommand::parse(&name, value.as_ref()) {
        let names = ControlCommand::NAMES.join(", ");
        return Err(format!("{e}. Known commands: {names}").into());
    }

    let bridge = BridgeInterfaceProxy::new(&conn).await?;
    bridge
        .command(name.clone(), payload.clone().unwrap_or_default())
        .await?;
    println!("Sent {}", name.to_ascii_uppercase());

    Ok(())
}
