use thiserror::Error;

use crate::drivers::procon2::hid_report::{Button, ButtonState};

pub mod gamepad;


/// Possible errors writing to a virtual output device
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("failed to create virtual device: {0}")]
    Create(std::io::Error),
    #[error("failed to emit events: {0}")]
    Io(#[from] std::io::Error),
}

/// One calibrated output sample handed to the output device
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GamepadPacket {
    pub buttons: ButtonState,
    /// Calibrated left stick in [-100, 100]
    pub left_stick: (f64, f64),
    /// Calibrated right stick in [-100, 100]
    pub right_stick: (f64, f64),
    /// Remapped triggers in [0, 255]
    pub left_trigger: u8,
    pub right_trigger: u8,
}

impl GamepadPacket {
    pub fn pressed(&self, button: Button) -> bool {
        self.buttons.get(button)
    }
}

/// A [TargetDevice] is any virtual device that accepts calibrated gamepad
/// packets.
pub trait TargetDevice {
    fn write(&mut self, packet: &GamepadPacket) -> Result<(), TargetError>;
}
