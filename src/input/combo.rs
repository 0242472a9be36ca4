//! Chord detection for the hidden macro layer.
//!
//! Holding L3+R3 (the chord) unlocks a set of secondary combos. Buttons that
//! take part in a recognized combo are suppressed so they never reach the
//! virtual gamepad.
use std::{
    collections::BTreeSet,
    time::{Duration, Instant},
};

use crate::drivers::procon2::hid_report::{self, Button, ButtonState, InputState, RawFrame};

/// Action triggered by a combo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComboAction {
    None,
    ToggleMacroMode,
    ToggleRecording,
    PrevSlot,
    NextSlot,
    PlayMacro,
    StopPlayback,
}

/// The two buttons that must be held together to unlock combos
pub const CHORD: [Button; 2] = [Button::L3, Button::R3];

/// Button that toggles macro mode when held together with the chord
pub const HOLD_TARGET: Button = Button::DpadDown;

/// How long the hold target must be held to toggle macro mode
pub const HOLD_DURATION: Duration = Duration::from_millis(500);

/// Edge-triggered combos while the chord is held
pub const INSTANT_COMBOS: [(Button, ComboAction); 4] = [
    (Button::DpadLeft, ComboAction::PrevSlot),
    (Button::DpadRight, ComboAction::NextSlot),
    (Button::A, ComboAction::PlayMacro),
    (Button::B, ComboAction::StopPlayback),
];

/// Set of buttons that should not be forwarded this tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuppressedButtons {
    buttons: BTreeSet<Button>,
}

impl SuppressedButtons {
    pub fn add(&mut self, button: Button) {
        self.buttons.insert(button);
    }

    pub fn contains(&self, button: Button) -> bool {
        self.buttons.contains(&button)
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buttons.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Button> + '_ {
        self.buttons.iter().copied()
    }

    /// Release the suppressed buttons in a decoded state
    pub fn filter_buttons(&self, state: &mut InputState) {
        state.filter_buttons(self.iter());
    }

    /// Return a copy of the raw report with the suppressed buttons cleared
    pub fn filter_raw(&self, raw: &RawFrame) -> RawFrame {
        hid_report::filter(raw, self.iter())
    }
}

/// Combo detector state machine
#[derive(Debug)]
pub struct ComboDetector {
    macro_mode: bool,
    hold_start: Option<Instant>,
    /// Set after the hold fires, cleared when the hold target is released
    hold_latched: bool,
    prev_buttons: ButtonState,
    prev_chord_held: bool,
}

impl Default for ComboDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ComboDetector {
    pub fn new() -> Self {
        Self {
            macro_mode: false,
            hold_start: None,
            hold_latched: false,
            prev_buttons: ButtonState::default(),
            prev_chord_held: false,
        }
    }

    pub fn macro_mode(&self) -> bool {
        self.macro_mode
    }

    pub fn set_macro_mode(&mut self, enabled: bool) {
        self.macro_mode = enabled;
    }

    /// Returns how long the hold target has been held with the chord at the
    /// given instant, if it is being held.
    pub fn hold_duration(&self, now: Instant) -> Option<Duration> {
        self.hold_start
            .map(|start| now.saturating_duration_since(start))
    }

    /// Process the button state of one frame
    pub fn update(&mut self, buttons: &ButtonState) -> (ComboAction, SuppressedButtons) {
        self.update_at(buttons, Instant::now())
    }

    /// Process the button state of one frame observed at the given instant.
    ///
    /// Checks run in a fixed order (hold timer, instant edges, chord
    /// re-assert) and a later check overwrites the action of an earlier one.
    pub fn update_at(
        &mut self,
        buttons: &ButtonState,
        now: Instant,
    ) -> (ComboAction, SuppressedButtons) {
        let chord_held = CHORD.iter().all(|button| buttons.get(*button));
        let mut action = ComboAction::None;
        let mut suppressed = SuppressedButtons::default();

        if chord_held {
            for button in CHORD {
                suppressed.add(button);
            }

            // Hold target
            let hold_pressed = buttons.get(HOLD_TARGET);
            if hold_pressed {
                suppressed.add(HOLD_TARGET);
                match self.hold_start {
                    None if !self.hold_latched => self.hold_start = Some(now),
                    None => (),
                    Some(start) => {
                        if now.saturating_duration_since(start) >= HOLD_DURATION {
                            log::debug!("Hold combo triggered");
                            action = ComboAction::ToggleMacroMode;
                            self.hold_start = None;
                            self.hold_latched = true;
                        }
                    }
                }
            } else {
                self.hold_start = None;
                self.hold_latched = false;
            }

            // Instant combos
            for (button, combo_action) in INSTANT_COMBOS {
                let pressed = buttons.get(button);
                if pressed {
                    suppressed.add(button);
                }
                if pressed && !self.prev_buttons.get(button) {
                    log::debug!("Instant combo triggered: {button}");
                    action = combo_action;
                }
            }

            // In macro mode, the chord alone toggles recording
            if self.macro_mode && !self.prev_chord_held {
                let any_combo_button = hold_pressed
                    || INSTANT_COMBOS
                        .iter()
                        .any(|(button, _)| buttons.get(*button));
                if !any_combo_button {
                    action = ComboAction::ToggleRecording;
                }
            }
        } else {
            self.hold_start = None;
            self.hold_latched = false;
        }

        self.prev_buttons = *buttons;
        self.prev_chord_held = chord_held;

        (action, suppressed)
    }
}
