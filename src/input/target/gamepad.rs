//! Virtual uinput gamepad that mirrors the physical controller.
use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AbsInfo, AbsoluteAxisCode, AttributeSet, BusType, EventType, InputEvent, InputId, KeyCode,
    SynchronizationCode, SynchronizationEvent, UinputAbsSetup,
};

use crate::{
    drivers::procon2::{
        driver::{PID, VID},
        hid_report::Button,
    },
    input::calibration::STICK_RANGE,
};

use super::{GamepadPacket, TargetDevice, TargetError};

pub const DEVICE_NAME: &str = "Nintendo Switch 2 Pro Controller (padrelay)";

/// Maximum absolute value of a stick axis
pub const AXIS_MAX: i32 = 32767;

/// Key code emitted for every controller button
pub fn key_code(button: Button) -> KeyCode {
    match button {
        Button::B => KeyCode::BTN_EAST,
        Button::A => KeyCode::BTN_SOUTH,
        Button::Y => KeyCode::BTN_WEST,
        Button::X => KeyCode::BTN_NORTH,
        Button::R => KeyCode::BTN_TR,
        Button::ZR => KeyCode::BTN_TR2,
        Button::Plus => KeyCode::BTN_START,
        Button::R3 => KeyCode::BTN_THUMBR,
        Button::DpadDown => KeyCode::BTN_DPAD_DOWN,
        Button::DpadRight => KeyCode::BTN_DPAD_RIGHT,
        Button::DpadLeft => KeyCode::BTN_DPAD_LEFT,
        Button::DpadUp => KeyCode::BTN_DPAD_UP,
        Button::L => KeyCode::BTN_TL,
        Button::ZL => KeyCode::BTN_TL2,
        Button::Minus => KeyCode::BTN_SELECT,
        Button::L3 => KeyCode::BTN_THUMBL,
        Button::Home => KeyCode::BTN_MODE,
        Button::Capture => KeyCode::BTN_C,
        Button::Thumb2 => KeyCode::BTN_THUMB2,
        Button::Thumb => KeyCode::BTN_THUMB,
        Button::Z => KeyCode::BTN_Z,
    }
}

/// Scale a calibrated axis value in [-100, 100] to the uinput axis range
pub fn scale_axis(value: f64) -> i32 {
    let value = value.clamp(-STICK_RANGE, STICK_RANGE);
    (value / STICK_RANGE * AXIS_MAX as f64).round() as i32
}

/// Translate a packet into the evdev events that describe it. Stick Y axes
/// are inverted since evdev treats "down" as positive.
pub fn translate_packet(packet: &GamepadPacket) -> Vec<InputEvent> {
    let mut events: Vec<InputEvent> = Button::all()
        .map(|button| {
            let value = packet.pressed(button) as i32;
            InputEvent::new(EventType::KEY.0, key_code(button).0, value)
        })
        .collect();

    let axes = [
        (AbsoluteAxisCode::ABS_X, scale_axis(packet.left_stick.0)),
        (AbsoluteAxisCode::ABS_Y, -scale_axis(packet.left_stick.1)),
        (AbsoluteAxisCode::ABS_RX, scale_axis(packet.right_stick.0)),
        (AbsoluteAxisCode::ABS_RY, -scale_axis(packet.right_stick.1)),
        (AbsoluteAxisCode::ABS_Z, packet.left_trigger as i32),
        (AbsoluteAxisCode::ABS_RZ, packet.right_trigger as i32),
    ];
    for (code, value) in axes {
        events.push(InputEvent::new(EventType::ABSOLUTE.0, code.0, value));
    }

    events
}

/// uinput backed [TargetDevice]
pub struct VirtualGamepad {
    device: VirtualDevice,
}

impl VirtualGamepad {
    pub fn new() -> Result<Self, TargetError> {
        log::debug!("Creating virtual gamepad");
        let device = Self::create_virtual_device().map_err(TargetError::Create)?;
        Ok(Self { device })
    }

    /// Create the virtual device to emulate
    fn create_virtual_device() -> Result<VirtualDevice, std::io::Error> {
        // Setup Key inputs
        let mut keys = AttributeSet::<KeyCode>::new();
        for button in Button::all() {
            keys.insert(key_code(button));
        }

        // Setup ABS inputs
        let joystick_setup = AbsInfo::new(0, -AXIS_MAX, AXIS_MAX, 16, 128, 1);
        let abs_x = UinputAbsSetup::new(AbsoluteAxisCode::ABS_X, joystick_setup);
        let abs_y = UinputAbsSetup::new(AbsoluteAxisCode::ABS_Y, joystick_setup);
        let abs_rx = UinputAbsSetup::new(AbsoluteAxisCode::ABS_RX, joystick_setup);
        let abs_ry = UinputAbsSetup::new(AbsoluteAxisCode::ABS_RY, joystick_setup);
        let triggers_setup = AbsInfo::new(0, 0, 255, 0, 0, 1);
        let abs_z = UinputAbsSetup::new(AbsoluteAxisCode::ABS_Z, triggers_setup);
        let abs_rz = UinputAbsSetup::new(AbsoluteAxisCode::ABS_RZ, triggers_setup);

        // Identify to the kernel as a USB gamepad
        let id = InputId::new(BusType(3), VID, PID, 1);

        // Build the device
        let device = VirtualDeviceBuilder::new()?
            .name(DEVICE_NAME)
            .input_id(id)
            .with_keys(&keys)?
            .with_absolute_axis(&abs_x)?
            .with_absolute_axis(&abs_y)?
            .with_absolute_axis(&abs_rx)?
            .with_absolute_axis(&abs_ry)?
            .with_absolute_axis(&abs_z)?
            .with_absolute_axis(&abs_rz)?
            .build()?;

        Ok(device)
    }
}

impl TargetDevice for VirtualGamepad {
    fn write(&mut self, packet: &GamepadPacket) -> Result<(), TargetError> {
        let events = translate_packet(packet);
        self.device.emit(events.as_slice())?;
        self.device
            .emit(&[SynchronizationEvent::new(SynchronizationCode::SYN_REPORT, 0).into()])?;
        Ok(())
    }
}
