//! The real-time loop that connects the physical controller to the virtual
//! gamepad and drives the macro subsystem.
pub mod command;
pub mod state;


use std::{
    future::Future,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::{
    drivers::procon2::hid_report::{decode, InputState, RawFrame},
    input::{
        calibration::{auto_calibrate_centers, remap_trigger, StickCalibrator, StickCenters},
        combo::{ComboAction, ComboDetector},
        source::{FrameSource, SourceError},
        target::{GamepadPacket, TargetDevice, TargetError},
    },
    macros::controller::{MacroCommand, MacroController, MacroEffect},
};

use command::ControlCommand;
use state::StateSnapshot;

/// Possible errors that end the bridge loop
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("input source failed: {0}")]
    Source(#[from] SourceError),
    #[error("output device failed: {0}")]
    Target(#[from] TargetError),
}

/// Wait for the given shutdown signal and raise the stop flag when it
/// arrives. The loop then exits on its next tick and saves any recording.
pub async fn stop_on_signal<F>(signal: F, stop: Arc<AtomicBool>)
where
    F: Future<Output = io::Result<&'static str>>,
{
    match signal.await {
        Ok(name) => {
            log::info!("Got {name}, shutting down");
            stop.store(true, Ordering::Relaxed);
        }
        Err(e) => log::error!("Unable to listen for shutdown signals: {e}"),
    }
}

/// Calibrators for both sticks
#[derive(Debug, Clone)]
pub struct StickCalibration {
    pub left: StickCalibrator,
    pub right: StickCalibrator,
}

pub struct Bridge<S: FrameSource, T: TargetDevice> {
    source: S,
    target: T,
    calibration: StickCalibration,
    centers: StickCenters,
    combo: ComboDetector,
    controller: MacroController,
    commands: mpsc::UnboundedReceiver<ControlCommand>,
    state_tx: watch::Sender<StateSnapshot>,
    catalog_tx: watch::Sender<u64>,
    stop: Arc<AtomicBool>,
    connected: bool,
}

impl<S: FrameSource, T: TargetDevice> Bridge<S, T> {
    pub fn new(
        source: S,
        target: T,
        calibration: StickCalibration,
        controller: MacroController,
        commands: mpsc::UnboundedReceiver<ControlCommand>,
    ) -> Self {
        let (state_tx, _) = watch::channel(StateSnapshot::default());
        let (catalog_tx, _) = watch::channel(0);
        let mut bridge = Self {
            source,
            target,
            calibration,
            centers: StickCenters::default(),
            combo: ComboDetector::new(),
            controller,
            commands,
            state_tx,
            catalog_tx,
            stop: Arc::new(AtomicBool::new(false)),
            connected: false,
        };
        bridge.publish_state();
        bridge
    }

    /// Receiver of state snapshots, updated whenever the state changes
    pub fn subscribe_state(&self) -> watch::Receiver<StateSnapshot> {
        self.state_tx.subscribe()
    }

    /// Receiver of a counter that increments whenever the catalog changes
    pub fn subscribe_catalog(&self) -> watch::Receiver<u64> {
        self.catalog_tx.subscribe()
    }

    /// Flag that stops the loop before its next tick when set
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn controller(&self) -> &MacroController {
        &self.controller
    }

    pub fn combo(&self) -> &ComboDetector {
        &self.combo
    }

    pub fn centers(&self) -> StickCenters {
        self.centers
    }

    /// Measure the stick centers from the given number of idle reports.
    pub fn calibrate_centers(&mut self, samples: usize) -> Result<StickCenters, SourceError> {
        log::info!("Calibrating stick centers (don't touch the sticks)...");
        let mut frames = Vec::with_capacity(samples);
        for _ in 0..samples {
            match self.source.read_frame() {
                Ok(frame) => frames.push(frame),
                Err(SourceError::Disconnected) => return Err(SourceError::Disconnected),
                Err(e) => {
                    log::warn!("Stopping center calibration early: {e}");
                    break;
                }
            }
        }

        self.centers = auto_calibrate_centers(&frames);
        log::info!(
            "Left stick center: {:?}, Right: {:?} ({} samples)",
            self.centers.left,
            self.centers.right,
            frames.len()
        );
        Ok(self.centers)
    }

    /// Run the loop until the controller disconnects or a stop is requested.
    /// An in-flight recording is saved on the way out.
    pub fn run(&mut self) -> Result<(), BridgeError> {
        log::info!("Starting bridge loop");
        self.connected = true;
        self.publish_state();

        let result = self.run_loop();
        if let Err(e) = &result {
            log::error!("Bridge loop failed: {e}");
        }

        let effect = self.controller.flush();
        self.apply_effect(effect);
        self.connected = false;
        self.publish_state();
        log::info!("Bridge loop stopped");

        result
    }

    fn run_loop(&mut self) -> Result<(), BridgeError> {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                log::info!("Stop requested");
                return Ok(());
            }

            self.drain_commands(Instant::now());

            let raw = match self.source.read_frame() {
                Ok(raw) => raw,
                Err(SourceError::Disconnected) => {
                    log::info!("Controller disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            self.tick_at(&raw, Instant::now())?;
        }
    }

    /// Execute every queued control command in order
    pub fn drain_commands(&mut self, now: Instant) {
        while let Ok(command) = self.commands.try_recv() {
            log::debug!("Got control command: {command:?}");
            match command {
                ControlCommand::ToggleMacroMode => self.toggle_macro_mode(),
                ControlCommand::Macro(command) => {
                    let effect = self.controller.execute_at(command, now);
                    self.apply_effect(effect);
                }
            }
        }
        self.publish_state();
    }

    /// Process one input report observed at the given instant
    pub fn tick_at(&mut self, raw: &RawFrame, now: Instant) -> Result<(), TargetError> {
        let mut live = decode(raw);
        let (action, suppressed) = self.combo.update_at(&live.buttons, now);

        // Live input can only abort an active playback
        let playing = self.controller.is_playing();
        if !playing || action == ComboAction::StopPlayback {
            self.handle_action(action, now);
        } else if action != ComboAction::None {
            log::debug!("Ignoring {action:?} during playback");
        }

        let filtered = suppressed.filter_raw(raw);
        suppressed.filter_buttons(&mut live);

        let output = if playing {
            match self.controller.playback_frame_at(now) {
                Some(frame) => decode(&frame),
                None => live,
            }
        } else {
            live
        };

        let packet = self.build_packet(&output);
        self.target.write(&packet)?;

        if !playing {
            self.controller.record_at(&filtered, now);
        }

        self.publish_state();
        Ok(())
    }

    /// Calibrate a decoded report into an output packet
    pub fn build_packet(&self, state: &InputState) -> GamepadPacket {
        GamepadPacket {
            buttons: state.buttons,
            left_stick: self
                .calibration
                .left
                .calibrate_raw(state.left_stick_raw, self.centers.left),
            right_stick: self
                .calibration
                .right
                .calibrate_raw(state.right_stick_raw, self.centers.right),
            left_trigger: remap_trigger(state.left_trigger),
            right_trigger: remap_trigger(state.right_trigger),
        }
    }

    fn handle_action(&mut self, action: ComboAction, now: Instant) {
        let command = match action {
            ComboAction::None => return,
            ComboAction::ToggleMacroMode => {
                self.toggle_macro_mode();
                return;
            }
            ComboAction::ToggleRecording => MacroCommand::ToggleRecording,
            ComboAction::PrevSlot => MacroCommand::PrevSlot,
            ComboAction::NextSlot => MacroCommand::NextSlot,
            ComboAction::PlayMacro => MacroCommand::PlayMacro,
            ComboAction::StopPlayback => MacroCommand::StopPlayback,
        };
        let effect = self.controller.execute_at(command, now);
        self.apply_effect(effect);
    }

    fn toggle_macro_mode(&mut self) {
        let enabled = !self.combo.macro_mode();
        self.combo.set_macro_mode(enabled);
        let effect = self.controller.set_macro_mode(enabled);
        self.apply_effect(effect);
    }

    fn apply_effect(&mut self, effect: MacroEffect) {
        if effect.catalog_changed {
            self.catalog_tx.send_modify(|generation| *generation += 1);
        }
    }

    /// Current state of the bridge
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            macro_mode: self.combo.macro_mode(),
            recording: self.controller.is_recording(),
            playing: self.controller.is_playing(),
            current_slot: self.controller.current_slot(),
            slot_count: self.controller.slot_count(),
            current_macro_name: self.controller.current_macro_name().map(String::from),
            playback_speed: self.controller.player().speed(),
            connected: self.connected,
        }
    }

    fn publish_state(&mut self) {
        let snapshot = self.snapshot();
        self.state_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}
