use std::time::Instant;

use crate::drivers::procon2::hid_report::RawFrame;

use super::{
    player::MacroPlayer,
    recorder::MacroRecorder,
    storage::{MacroError, MacroStore},
};

/// Commands that operate on the macro subsystem. They can originate from a
/// combo on the controller or from the control surface.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroCommand {
    ToggleRecording,
    PrevSlot,
    NextSlot,
    SelectSlot(usize),
    PlayMacro,
    StopPlayback,
    RenameMacro(u32, String),
    DeleteMacro(u32),
    CycleSpeed,
    SetPlaybackSpeed(f64),
}

/// Side effects of executing a command that the caller needs to apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacroEffect {
    /// The catalog changed and listeners should be told
    pub catalog_changed: bool,
}

impl MacroEffect {
    fn none() -> Self {
        Self::default()
    }

    fn catalog_changed() -> Self {
        Self {
            catalog_changed: true,
        }
    }
}

/// Owns the recorder, the player and the slot selection
pub struct MacroController {
    store: MacroStore,
    recorder: MacroRecorder,
    player: MacroPlayer,
    current_slot: usize,
    cached_slot_count: usize,
    cached_macro_name: Option<String>,
}

impl MacroController {
    pub fn new(store: MacroStore) -> Self {
        let mut controller = Self {
            store,
            recorder: MacroRecorder::new(),
            player: MacroPlayer::new(),
            current_slot: 0,
            cached_slot_count: 0,
            cached_macro_name: None,
        };
        controller.refresh_cache();
        controller
    }

    pub fn store(&self) -> &MacroStore {
        &self.store
    }

    pub fn recorder(&self) -> &MacroRecorder {
        &self.recorder
    }

    pub fn player(&self) -> &MacroPlayer {
        &self.player
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    pub fn slot_count(&self) -> usize {
        self.cached_slot_count
    }

    pub fn current_macro_name(&self) -> Option<&str> {
        self.cached_macro_name.as_deref()
    }

    /// Append a report to the active recording, if any
    pub fn record_at(&mut self, raw: &RawFrame, now: Instant) {
        self.recorder.add_frame_at(raw, now);
    }

    /// Returns the playback report due at the given instant, if playing
    pub fn playback_frame_at(&mut self, now: Instant) -> Option<RawFrame> {
        self.player.get_frame_at(now)
    }

    /// Execute a macro command and return its side effects
    pub fn execute(&mut self, command: MacroCommand) -> MacroEffect {
        self.execute_at(command, Instant::now())
    }

    /// Execute a macro command at the given instant. Recording and playback
    /// clocks started by the command start at `now`.
    pub fn execute_at(&mut self, command: MacroCommand, now: Instant) -> MacroEffect {
        log::debug!("Executing macro command: {command:?}");
        match command {
            MacroCommand::ToggleRecording => self.toggle_recording(now),
            MacroCommand::PrevSlot => self.prev_slot(),
            MacroCommand::NextSlot => self.next_slot(),
            MacroCommand::SelectSlot(slot) => self.select_slot(slot),
            MacroCommand::PlayMacro => self.play_macro(now),
            MacroCommand::StopPlayback => self.stop_playback(),
            MacroCommand::RenameMacro(id, name) => self.rename_macro(id, &name),
            MacroCommand::DeleteMacro(id) => self.delete_macro(id),
            MacroCommand::CycleSpeed => {
                self.player.cycle_speed();
                MacroEffect::none()
            }
            MacroCommand::SetPlaybackSpeed(speed) => {
                self.player.set_speed(speed);
                MacroEffect::none()
            }
        }
    }

    /// Apply a macro mode change. Leaving macro mode stops and saves an
    /// in-flight recording.
    pub fn set_macro_mode(&mut self, enabled: bool) -> MacroEffect {
        if enabled {
            self.refresh_cache();
            log::info!(
                "Macro mode ON. {} macro(s). Slot: {}",
                self.cached_slot_count,
                self.current_slot
            );
            return MacroEffect::none();
        }

        log::info!("Macro mode OFF");
        if self.recorder.is_recording() {
            return self.finish_recording();
        }
        MacroEffect::none()
    }

    /// Save an in-flight recording. Called on shutdown.
    pub fn flush(&mut self) -> MacroEffect {
        if !self.recorder.is_recording() {
            return MacroEffect::none();
        }
        log::info!("Saving in-flight recording");
        self.finish_recording()
    }

    /// Reload the slot count and the current macro name from the store
    pub fn refresh_cache(&mut self) {
        let entries = match self.store.list() {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Unable to read macro catalog: {e}");
                return;
            }
        };
        self.cached_slot_count = entries.len();
        if self.current_slot >= entries.len() {
            self.current_slot = entries.len().saturating_sub(1);
        }
        self.cached_macro_name = entries.get(self.current_slot).map(|e| e.name.clone());
    }

    fn finish_recording(&mut self) -> MacroEffect {
        self.recorder.stop();
        let result = self.recorder.save(&self.store, None);
        self.refresh_cache();
        match result {
            Ok(id) => {
                log::info!("Recording saved as macro {id}");
                MacroEffect::catalog_changed()
            }
            Err(MacroError::NoData) => {
                log::info!("Recording was empty, nothing saved");
                MacroEffect::none()
            }
            Err(e) => {
                log::error!("Failed to save recording: {e}");
                MacroEffect::none()
            }
        }
    }

    fn toggle_recording(&mut self, now: Instant) -> MacroEffect {
        if self.recorder.is_recording() {
            return self.finish_recording();
        }
        self.recorder.start_at(now);
        MacroEffect::none()
    }

    fn prev_slot(&mut self) -> MacroEffect {
        if self.cached_slot_count > 0 {
            self.current_slot = if self.current_slot == 0 {
                self.cached_slot_count - 1
            } else {
                self.current_slot - 1
            };
            self.refresh_cache();
            log::info!("Slot {} selected", self.current_slot);
        }
        MacroEffect::none()
    }

    fn next_slot(&mut self) -> MacroEffect {
        if self.cached_slot_count > 0 {
            self.current_slot = (self.current_slot + 1) % self.cached_slot_count;
            self.refresh_cache();
            log::info!("Slot {} selected", self.current_slot);
        }
        MacroEffect::none()
    }

    fn select_slot(&mut self, slot: usize) -> MacroEffect {
        if slot < self.cached_slot_count {
            self.current_slot = slot;
            self.refresh_cache();
            log::info!("Slot {} selected", self.current_slot);
        } else {
            log::debug!("Ignoring out of range slot {slot}");
        }
        MacroEffect::none()
    }

    fn play_macro(&mut self, now: Instant) -> MacroEffect {
        let id = match self.store.id_by_slot(self.current_slot) {
            Ok(Some(id)) => id,
            Ok(None) => {
                log::debug!("No macro in slot {}", self.current_slot);
                return MacroEffect::none();
            }
            Err(e) => {
                log::warn!("Unable to read macro catalog: {e}");
                return MacroEffect::none();
            }
        };

        if let Err(e) = self.player.load(&self.store, id) {
            log::warn!("Unable to load macro {id}: {e}");
            return MacroEffect::none();
        }
        if self.player.start_at(false, now) {
            log::info!("Playing macro {id} (slot {})", self.current_slot);
        }
        MacroEffect::none()
    }

    fn stop_playback(&mut self) -> MacroEffect {
        if self.player.is_playing() {
            self.player.stop();
        }
        MacroEffect::none()
    }

    fn rename_macro(&mut self, id: u32, name: &str) -> MacroEffect {
        match self.store.rename(id, name) {
            Ok(()) => {
                self.refresh_cache();
                MacroEffect::catalog_changed()
            }
            Err(e) => {
                log::warn!("Unable to rename macro {id}: {e}");
                MacroEffect::none()
            }
        }
    }

    fn delete_macro(&mut self, id: u32) -> MacroEffect {
        if self.player.loaded_id() == Some(id) {
            self.player.close();
        }
        match self.store.delete(id) {
            Ok(()) => {
                self.refresh_cache();
                MacroEffect::catalog_changed()
            }
            Err(e) => {
                log::warn!("Unable to delete macro {id}: {e}");
                MacroEffect::none()
            }
        }
    }
}
