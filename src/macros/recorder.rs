use std::time::Instant;

use crate::drivers::procon2::hid_report::RawFrame;

use super::storage::{MacroError, MacroFrame, MacroStore};

/// Accumulates timestamped input reports in memory
#[derive(Debug, Default)]
pub struct MacroRecorder {
    recording: bool,
    frames: Vec<MacroFrame>,
    start: Option<Instant>,
}

impl MacroRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[MacroFrame] {
        &self.frames
    }

    /// Clear the buffer and start the recording clock
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    pub fn start_at(&mut self, now: Instant) {
        self.frames.clear();
        self.start = Some(now);
        self.recording = true;
        log::info!("Recording started");
    }

    /// Append a copy of the report if recording
    pub fn add_frame(&mut self, raw: &RawFrame) {
        self.add_frame_at(raw, Instant::now());
    }

    pub fn add_frame_at(&mut self, raw: &RawFrame, now: Instant) {
        if !self.recording {
            return;
        }
        let elapsed_us = self
            .start
            .map(|start| now.saturating_duration_since(start).as_micros() as u64)
            .unwrap_or(0);
        self.frames.push((elapsed_us, *raw));
    }

    /// Stop recording. Returns (frame count, duration in microseconds).
    pub fn stop(&mut self) -> (usize, u64) {
        self.recording = false;
        let frame_count = self.frames.len();
        let duration_us = self.frames.last().map(|(ts, _)| *ts).unwrap_or(0);
        log::info!(
            "Recording stopped: {frame_count} frames, {}ms",
            duration_us / 1000
        );
        (frame_count, duration_us)
    }

    /// Write the buffered frames as a new macro and clear the buffer
    pub fn save(&mut self, store: &MacroStore, name: Option<&str>) -> Result<u32, MacroError> {
        let frames = std::mem::take(&mut self.frames);
        store.save(&frames, name)
    }
}
