use serde_json::Value;
use tokio::sync::{mpsc, watch};
use zbus::{fdo, object_server::SignalEmitter, Connection};
use zbus_macros::interface;

use crate::{
    bridge::{command::ControlCommand, state::StateSnapshot},
    constants::BUS_PATH,
    macros::{controller::MacroCommand, storage::MacroStore},
};

/// The [BridgeInterface] exposes the bridge state and macro controls over
/// DBus. Commands are forwarded to the bridge loop through a channel and
/// executed there in the order they were received.
pub struct BridgeInterface {
    tx: mpsc::UnboundedSender<ControlCommand>,
    state: watch::Receiver<StateSnapshot>,
    store: MacroStore,
}

impl BridgeInterface {
    pub fn new(
        tx: mpsc::UnboundedSender<ControlCommand>,
        state: watch::Receiver<StateSnapshot>,
        store: MacroStore,
    ) -> BridgeInterface {
        BridgeInterface { tx, state, store }
    }

    /// Queue a command for the bridge loop
    pub fn send(&self, command: ControlCommand) -> fdo::Result<()> {
        self.tx
            .send(command)
            .map_err(|_| fdo::Error::Failed("Bridge is not running".to_string()))
    }

    fn snapshot(&self) -> StateSnapshot {
        self.state.borrow().clone()
    }

    /// Catalog entries serialized as a JSON array
    pub fn macros_json(&self) -> fdo::Result<String> {
        let entries = self
            .store
            .list()
            .map_err(|e| fdo::Error::Failed(e.to_string()))?;
        serde_json::to_string(&entries).map_err(|e| fdo::Error::Failed(e.to_string()))
    }
}

#[interface(
    name = "org.padrelay.Bridge",
    proxy(
        default_service = "org.padrelay.Bridge",
        default_path = "/org/padrelay/Bridge"
    )
)]
impl BridgeInterface {
    #[zbus(property)]
    async fn version(&self) -> fdo::Result<String> {
        const VERSION: &str = env!("CARGO_PKG_VERSION");
        Ok(VERSION.to_string())
    }

    #[zbus(property)]
    async fn macro_mode(&self) -> fdo::Result<bool> {
        Ok(self.state.borrow().macro_mode)
    }

    #[zbus(property)]
    async fn recording(&self) -> fdo::Result<bool> {
        Ok(self.state.borrow().recording)
    }

    #[zbus(property)]
    async fn playing(&self) -> fdo::Result<bool> {
        Ok(self.state.borrow().playing)
    }

    #[zbus(property)]
    async fn current_slot(&self) -> fdo::Result<u32> {
        Ok(self.state.borrow().current_slot as u32)
    }

    #[zbus(property)]
    async fn slot_count(&self) -> fdo::Result<u32> {
        Ok(self.state.borrow().slot_count as u32)
    }

    /// Name of the macro in the current slot, or an empty string
    #[zbus(property)]
    async fn current_macro_name(&self) -> fdo::Result<String> {
        Ok(self
            .state
            .borrow()
            .current_macro_name
            .clone()
            .unwrap_or_default())
    }

    #[zbus(property)]
    async fn playback_speed(&self) -> fdo::Result<f64> {
        Ok(self.state.borrow().playback_speed)
    }

    /// True while the physical controller is being read
    #[zbus(property)]
    async fn connected(&self) -> fdo::Result<bool> {
        Ok(self.state.borrow().connected)
    }

    /// Returns the full bridge state as a JSON object
    async fn state(&self) -> fdo::Result<String> {
        serde_json::to_string(&self.snapshot()).map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    /// Returns the macro catalog as a JSON array
    async fn list_macros(&self) -> fdo::Result<String> {
        self.macros_json()
    }

    /// Execute a command by name. The payload is a JSON document, or an
    /// empty string for commands that take none.
    async fn command(&self, name: String, payload: String) -> fdo::Result<()> {
        let payload = if payload.trim().is_empty() {
            None
        } else {
            let value: Value = serde_json::from_str(&payload)
                .map_err(|e| fdo::Error::InvalidArgs(e.to_string()))?;
            Some(value)
        };
        let command = ControlCommand::parse(&name, payload.as_ref())
            .map_err(|e| fdo::Error::InvalidArgs(e.to_string()))?;
        self.send(command)
    }

    async fn toggle_macro_mode(&self) -> fdo::Result<()> {
        self.send(ControlCommand::ToggleMacroMode)
    }

    async fn toggle_recording(&self) -> fdo::Result<()> {
        self.send(MacroCommand::ToggleRecording.into())
    }

    async fn prev_slot(&self) -> fdo::Result<()> {
        self.send(MacroCommand::PrevSlot.into())
    }

    async fn next_slot(&self) -> fdo::Result<()> {
        self.send(MacroCommand::NextSlot.into())
    }

    async fn select_slot(&self, slot: u32) -> fdo::Result<()> {
        self.send(MacroCommand::SelectSlot(slot as usize).into())
    }

    async fn play_macro(&self) -> fdo::Result<()> {
        self.send(MacroCommand::PlayMacro.into())
    }

    async fn stop_playback(&self) -> fdo::Result<()> {
        self.send(MacroCommand::StopPlayback.into())
    }

    async fn rename_macro(&self, id: u32, name: String) -> fdo::Result<()> {
        if name.trim().is_empty() {
            return Err(fdo::Error::InvalidArgs(
                "Name must not be empty".to_string(),
            ));
        }
        self.send(MacroCommand::RenameMacro(id, name).into())
    }

    async fn delete_macro(&self, id: u32) -> fdo::Result<()> {
        self.send(MacroCommand::DeleteMacro(id).into())
    }

    async fn cycle_speed(&self) -> fdo::Result<()> {
        self.send(MacroCommand::CycleSpeed.into())
    }

    async fn set_playback_speed(&self, speed: f64) -> fdo::Result<()> {
        self.send(MacroCommand::SetPlaybackSpeed(speed).into())
    }

    /// Emitted with the JSON state whenever the bridge state changes
    #[zbus(signal)]
    pub async fn state_changed(emitter: &SignalEmitter<'_>, state: String) -> zbus::Result<()>;

    /// Emitted with the JSON catalog whenever macros are added, renamed or
    /// deleted
    #[zbus(signal)]
    pub async fn macros_changed(emitter: &SignalEmitter<'_>, macros: String)
        -> zbus::Result<()>;
}

impl BridgeInterface {
    /// Emit the given state on the bus along with the changed properties
    pub async fn emit_state(conn: &Connection, state: &StateSnapshot) -> zbus::Result<()> {
        // Get the object instance so we can send DBus signal updates
        let iface_ref = conn
            .object_server()
            .interface::<_, Self>(BUS_PATH)
            .await?;
        let json = serde_json::to_string(state).map_err(|e| zbus::Error::Failure(e.to_string()))?;
        iface_ref.state_changed(json).await?;

        let iface = iface_ref.get().await;
        let emitter = iface_ref.signal_emitter();
        iface.macro_mode_changed(emitter).await?;
        iface.recording_changed(emitter).await?;
        iface.playing_changed(emitter).await?;
        iface.current_slot_changed(emitter).await?;
        iface.slot_count_changed(emitter).await?;
        iface.current_macro_name_changed(emitter).await?;
        iface.playback_speed_changed(emitter).await?;
        iface.connected_changed(emitter).await?;
        Ok(())
    }

    /// Emit the current macro catalog on the bus
    pub async fn emit_macros(conn: &Connection) -> zbus::Result<()> {
        let iface_ref = conn
            .object_server()
            .interface::<_, Self>(BUS_PATH)
            .await?;
        let json = iface_ref
            .get()
            .await
            .macros_json()
            .map_err(|e| zbus::Error::Failure(e.to_string()))?;
        iface_ref.macros_changed(json).await?;
        Ok(())
    }
}
