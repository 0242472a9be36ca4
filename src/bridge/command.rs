use serde_json::Value;
use thiserror::Error;

use crate::macros::controller::MacroCommand;

/// Possible errors parsing a control command
#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("unknown command `{0}`")]
    Unknown(String),
    #[error("command `{0}` requires a payload")]
    MissingPayload(&'static str),
    #[error("invalid payload for `{command}`: {reason}")]
    InvalidPayload {
        command: &'static str,
        reason: String,
    },
    #[error("invalid json: {0}")]
    Json(String),
}

/// Commands sent from the control surface to the bridge loop
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    ToggleMacroMode,
    Macro(MacroCommand),
}

impl From<MacroCommand> for ControlCommand {
    fn from(command: MacroCommand) -> Self {
        ControlCommand::Macro(command)
    }
}

impl ControlCommand {
    /// All command names understood by [ControlCommand::parse]
    pub const NAMES: [&'static str; 11] = [
        "TOGGLE_MACRO_MODE",
        "TOGGLE_RECORDING",
        "PREV_SLOT",
        "NEXT_SLOT",
        "SELECT_SLOT",
        "PLAY_MACRO",
        "STOP_PLAYBACK",
        "RENAME_MACRO",
        "DELETE_MACRO",
        "CYCLE_SPEED",
        "SET_PLAYBACK_SPEED",
    ];

    /// Parse a command by name with an optional JSON payload.
    ///
    /// Payloads: SELECT_SLOT takes a slot index, DELETE_MACRO an id,
    /// RENAME_MACRO an `[id, "name"]` pair and SET_PLAYBACK_SPEED a number.
    pub fn parse(name: &str, payload: Option<&Value>) -> Result<Self, CommandError> {
        let command = match name.to_ascii_uppercase().as_str() {
            "TOGGLE_MACRO_MODE" => ControlCommand::ToggleMacroMode,
            "TOGGLE_RECORDING" => MacroCommand::ToggleRecording.into(),
            "PREV_SLOT" => MacroCommand::PrevSlot.into(),
            "NEXT_SLOT" => MacroCommand::NextSlot.into(),
            "PLAY_MACRO" => MacroCommand::PlayMacro.into(),
            "STOP_PLAYBACK" => MacroCommand::StopPlayback.into(),
            "CYCLE_SPEED" => MacroCommand::CycleSpeed.into(),
            "SELECT_SLOT" => {
                let slot = unsigned_payload("SELECT_SLOT", payload)?;
                MacroCommand::SelectSlot(slot as usize).into()
            }
            "DELETE_MACRO" => {
                let id = id_payload("DELETE_MACRO", payload)?;
                MacroCommand::DeleteMacro(id).into()
            }
            "RENAME_MACRO" => {
                const COMMAND: &str = "RENAME_MACRO";
                let payload = payload.ok_or(CommandError::MissingPayload(COMMAND))?;
                let invalid = |reason: &str| CommandError::InvalidPayload {
                    command: COMMAND,
                    reason: reason.to_string(),
                };
                let pair = payload
                    .as_array()
                    .ok_or_else(|| invalid("expected [id, name]"))?;
                let [id, name] = pair.as_slice() else {
                    return Err(invalid("expected [id, name]"));
                };
                let id = id_payload(COMMAND, Some(id))?;
                let name = name.as_str().ok_or_else(|| invalid("name must be a string"))?;
                if name.trim().is_empty() {
                    return Err(invalid("name must not be empty"));
                }
                MacroCommand::RenameMacro(id, name.to_string()).into()
            }
            "SET_PLAYBACK_SPEED" => {
                const COMMAND: &str = "SET_PLAYBACK_SPEED";
                let payload = payload.ok_or(CommandError::MissingPayload(COMMAND))?;
                let speed = payload.as_f64().ok_or_else(|| CommandError::InvalidPayload {
                    command: COMMAND,
                    reason: "expected a number".to_string(),
                })?;
                MacroCommand::SetPlaybackSpeed(speed).into()
            }
            _ => return Err(CommandError::Unknown(name.to_string())),
        };
        Ok(command)
    }

    /// Parse a `{"cmd": "...", "data": ...}` message
    pub fn from_json(text: &str) -> Result<Self, CommandError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| CommandError::Json(e.to_string()))?;
        let name = value
            .get("cmd")
            .and_then(Value::as_str)
            .ok_or_else(|| CommandError::Json("missing `cmd` field".to_string()))?;
        Self::parse(name, value.get("data"))
    }
}

fn unsigned_payload(command: &'static str, payload: Option<&Value>) -> Result<u64, CommandError> {
    let payload = payload.ok_or(CommandError::MissingPayload(command))?;
    payload.as_u64().ok_or_else(|| CommandError::InvalidPayload {
        command,
        reason: format!("expected a non-negative integer, got {payload}"),
    })
}

fn id_payload(command: &'static str, payload: Option<&Value>) -> Result<u32, CommandError> {
    let value = unsigned_payload(command, payload)?;
    u32::try_from(value).map_err(|_| CommandError::InvalidPayload {
        command,
        reason: format!("id {value} is out of range"),
    })
}
