//! Input report layout of the Switch 2 Pro Controller in USB HID mode.
//!
//! The controller sends a fixed 64 byte report after the init sequence:
//!
//! ```text
//!   [0]      Report ID (0x09)
//!   [1]      Counter
//!   [2]      Mode (0x23 after init)
//!   [3..6]   Button bitfields (see BUTTON_MAP)
//!   [6..9]   Left stick (two 12-bit values)
//!   [9..12]  Right stick (two 12-bit values)
//!   [12]     Unknown
//!   [13]     Left trigger
//!   [14]     Right trigger
//! ```
use std::fmt;

/// Size of one raw input report
pub const REPORT_SIZE: usize = 64;

/// Offset of the first button byte in the report
pub const BUTTONS_OFFSET: usize = 3;
/// Number of button bytes
pub const BUTTON_BYTES: usize = 3;
pub const LEFT_STICK_OFFSET: usize = 6;
pub const RIGHT_STICK_OFFSET: usize = 9;
pub const LEFT_TRIGGER_OFFSET: usize = 13;
pub const RIGHT_TRIGGER_OFFSET: usize = 14;

/// One raw protocol sample as read from the device
pub type RawFrame = [u8; REPORT_SIZE];

/// Every button the controller reports.
///
/// The discriminant of each variant is its index in [BUTTON_MAP].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Button {
    B,
    A,
    Y,
    X,
    R,
    ZR,
    Plus,
    R3,
    DpadDown,
    DpadRight,
    DpadLeft,
    DpadUp,
    L,
    ZL,
    Minus,
    L3,
    Home,
    Capture,
    Thumb2,
    Thumb,
    Z,
}

/// (byte offset within the button field, bitmask, button)
///
/// Decoding and suppression both go through this table.
pub const BUTTON_MAP: [(usize, u8, Button); 21] = [
    (0, 0x01, Button::B),
    (0, 0x02, Button::A),
    (0, 0x04, Button::Y),
    (0, 0x08, Button::X),
    (0, 0x10, Button::R),
    (0, 0x20, Button::ZR),
    (0, 0x40, Button::Plus),
    (0, 0x80, Button::R3),
    (1, 0x01, Button::DpadDown),
    (1, 0x02, Button::DpadRight),
    (1, 0x04, Button::DpadLeft),
    (1, 0x08, Button::DpadUp),
    (1, 0x10, Button::L),
    (1, 0x20, Button::ZL),
    (1, 0x40, Button::Minus),
    (1, 0x80, Button::L3),
    (2, 0x01, Button::Home),
    (2, 0x02, Button::Capture),
    (2, 0x04, Button::Thumb2),
    (2, 0x08, Button::Thumb),
    (2, 0x10, Button::Z),
];

impl Button {
    /// All buttons in table order
    pub fn all() -> impl Iterator<Item = Button> {
        BUTTON_MAP.iter().map(|(_, _, button)| *button)
    }

    /// Returns the (byte offset within the button field, bitmask) of the button
    pub fn position(self) -> (usize, u8) {
        let (offset, mask, _) = BUTTON_MAP[self as usize];
        (offset, mask)
    }

    /// Stable name of the button, e.g. "DPAD_DOWN"
    pub fn name(&self) -> &'static str {
        match self {
            Button::B => "B",
            Button::A => "A",
            Button::Y => "Y",
            Button::X => "X",
            Button::R => "R",
            Button::ZR => "ZR",
            Button::Plus => "PLUS",
            Button::R3 => "R3",
            Button::DpadDown => "DPAD_DOWN",
            Button::DpadRight => "DPAD_RIGHT",
            Button::DpadLeft => "DPAD_LEFT",
            Button::DpadUp => "DPAD_UP",
            Button::L => "L",
            Button::ZL => "ZL",
            Button::Minus => "MINUS",
            Button::L3 => "L3",
            Button::Home => "HOME",
            Button::Capture => "CAPTURE",
            Button::Thumb2 => "THUMB2",
            Button::Thumb => "THUMB",
            Button::Z => "Z",
        }
    }

    /// Look up a button by its stable name
    pub fn from_name(name: &str) -> Option<Button> {
        Button::all().find(|button| button.name() == name)
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Pressed state of every button, kept in the wire bit layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ButtonState {
    bytes: [u8; BUTTON_BYTES],
}

impl ButtonState {
    pub fn from_bytes(bytes: [u8; BUTTON_BYTES]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> [u8; BUTTON_BYTES] {
        self.bytes
    }

    pub fn get(&self, button: Button) -> bool {
        let (offset, mask) = button.position();
        self.bytes[offset] & mask != 0
    }

    pub fn set(&mut self, button: Button, pressed: bool) {
        let (offset, mask) = button.position();
        if pressed {
            self.bytes[offset] |= mask;
        } else {
            self.bytes[offset] &= !mask;
        }
    }

    /// Iterate over every button and its state
    pub fn iter(&self) -> impl Iterator<Item = (Button, bool)> + '_ {
        Button::all().map(|button| (button, self.get(button)))
    }

    /// Iterate over the pressed buttons only
    pub fn pressed(&self) -> impl Iterator<Item = Button> + '_ {
        Button::all().filter(|button| self.get(*button))
    }
}

/// Decoded contents of one input report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputState {
    pub buttons: ButtonState,
    /// Raw 12-bit left stick values (x, y)
    pub left_stick_raw: (u16, u16),
    /// Raw 12-bit right stick values (x, y)
    pub right_stick_raw: (u16, u16),
    pub left_trigger: u8,
    pub right_trigger: u8,
}

impl InputState {
    /// Release the given buttons in the decoded state
    pub fn filter_buttons<I>(&mut self, suppressed: I)
    where
        I: IntoIterator<Item = Button>,
    {
        for button in suppressed {
            self.buttons.set(button, false);
        }
    }
}

impl fmt::Display for InputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pressed: Vec<&str> = self.buttons.pressed().map(|b| b.name()).collect();
        write!(
            f,
            "buttons=[{}] left={:?} right={:?} lt={} rt={}",
            pressed.join(","),
            self.left_stick_raw,
            self.right_stick_raw,
            self.left_trigger,
            self.right_trigger
        )
    }
}

/// Unpack two 12-bit values from 3 bytes.
///
/// Layout: `[lo8_a] [hi4_b | hi4_a] [hi8_b]`
pub fn unpack_12bit_pair(data: &[u8]) -> (u16, u16) {
    let a = (data[0] as u16) | (((data[1] & 0x0F) as u16) << 8);
    let b = ((data[1] >> 4) as u16) | ((data[2] as u16) << 4);
    (a, b)
}

/// Pack two 12-bit values into 3 bytes. Values above 0xFFF are truncated.
pub fn pack_12bit_pair(a: u16, b: u16) -> [u8; 3] {
    let a = a & 0x0FFF;
    let b = b & 0x0FFF;
    [
        (a & 0xFF) as u8,
        ((a >> 8) as u8) | (((b & 0x0F) as u8) << 4),
        (b >> 4) as u8,
    ]
}

/// Decode a raw input report.
///
/// Panics if the buffer is shorter than [REPORT_SIZE]; a short buffer means
/// the frame source broke its contract and there is nothing to recover.
pub fn decode(raw: &[u8]) -> InputState {
    assert!(
        raw.len() >= REPORT_SIZE,
        "input report too short: {} < {REPORT_SIZE}",
        raw.len()
    );

    let mut bytes = [0u8; BUTTON_BYTES];
    bytes.copy_from_slice(&raw[BUTTONS_OFFSET..BUTTONS_OFFSET + BUTTON_BYTES]);

    InputState {
        buttons: ButtonState::from_bytes(bytes),
        left_stick_raw: unpack_12bit_pair(&raw[LEFT_STICK_OFFSET..LEFT_STICK_OFFSET + 3]),
        right_stick_raw: unpack_12bit_pair(&raw[RIGHT_STICK_OFFSET..RIGHT_STICK_OFFSET + 3]),
        left_trigger: raw[LEFT_TRIGGER_OFFSET],
        right_trigger: raw[RIGHT_TRIGGER_OFFSET],
    }
}

/// Return a copy of the report with the given buttons' bits cleared. All
/// other bytes are left untouched.
pub fn filter<I>(raw: &RawFrame, suppressed: I) -> RawFrame
where
    I: IntoIterator<Item = Button>,
{
    let mut filtered = *raw;
    for button in suppressed {
        let (offset, mask) = button.position();
        filtered[BUTTONS_OFFSET + offset] &= !mask;
    }
    filtered
}
