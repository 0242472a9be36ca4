use std::error::Error;

use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

use crate::{
    bridge::{command::ControlCommand, state::StateSnapshot},
    dbus::interface::bridge::BridgeInterface,
    drivers::procon2::hid_report::REPORT_SIZE,
    macros::{
        controller::MacroCommand,
        storage::{MacroEntry, MacroStore},
    },
};

#[test]
fn test_send_forwards_commands_in_order() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (_state_tx, state_rx) = watch::channel(StateSnapshot::default());
    let iface = BridgeInterface::new(tx, state_rx, MacroStore::new(dir.path()));

    iface.send(ControlCommand::ToggleMacroMode)?;
    iface.send(MacroCommand::SelectSlot(2).into())?;

    assert_eq!(rx.try_recv()?, ControlCommand::ToggleMacroMode);
    assert_eq!(
        rx.try_recv()?,
        ControlCommand::Macro(MacroCommand::SelectSlot(2))
    );
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[test]
fn test_send_fails_when_bridge_stopped() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (tx, rx) = mpsc::unbounded_channel();
    let (_state_tx, state_rx) = watch::channel(StateSnapshot::default());
    let iface = BridgeInterface::new(tx, state_rx, MacroStore::new(dir.path()));
    drop(rx);

    assert!(iface.send(ControlCommand::ToggleMacroMode).is_err());
    Ok(())
}

#[test]
fn test_macros_json() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let store = MacroStore::new(dir.path());
    let (tx, _rx) = mpsc::unbounded_channel();
    let (_state_tx, state_rx) = watch::channel(StateSnapshot::default());
    let iface = BridgeInterface::new(tx, state_rx, store.clone());

    assert_eq!(iface.macros_json()?, "[]");

    let frames = vec![(0, [0u8; REPORT_SIZE]), (8_000, [1u8; REPORT_SIZE])];
    let id = store.save(&frames, Some("jump"))?;

    let entries: Vec<MacroEntry> = serde_json::from_str(&iface.macros_json()?)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, id);
    assert_eq!(entries[0].name, "jump");
    assert_eq!(entries[0].frame_count, 2);
    Ok(())
}
