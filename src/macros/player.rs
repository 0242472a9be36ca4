//! Timestamp driven macro playback over a memory mapped trace.
use std::{fs::File, time::Instant};

use memmap2::Mmap;

use crate::drivers::procon2::hid_report::RawFrame;

use super::storage::{self, MacroError, MacroStore, PackedMacroHeader};

/// Available playback speed presets
pub const SPEED_PRESETS: [f64; 5] = [0.25, 0.5, 1.0, 2.0, 4.0];
pub const DEFAULT_SPEED: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Loaded,
    Playing,
}

/// Read-only view over a validated trace file
struct TraceView {
    id: u32,
    header: PackedMacroHeader,
    mmap: Mmap,
    _file: File,
}

impl TraceView {
    fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    fn frame(&self, index: usize) -> (u64, RawFrame) {
        storage::frame_at(&self.mmap[..], index)
    }
}

pub struct MacroPlayer {
    state: PlayerState,
    looping: bool,
    speed: f64,
    trace: Option<TraceView>,
    cursor: usize,
    start: Option<Instant>,
    last_report: Option<RawFrame>,
}

impl Default for MacroPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MacroPlayer {
    pub fn new() -> Self {
        Self {
            state: PlayerState::Idle,
            looping: false,
            speed: DEFAULT_SPEED,
            trace: None,
            cursor: 0,
            start: None,
            last_report: None,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Playing
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Id of the macro whose trace is currently mapped
    pub fn loaded_id(&self) -> Option<u32> {
        self.trace.as_ref().map(|trace| trace.id)
    }

    pub fn frame_count(&self) -> usize {
        self.trace.as_ref().map(|t| t.frame_count()).unwrap_or(0)
    }

    /// Index of the next frame to play
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Map the trace of the given macro. Any previously loaded trace is
    /// released first, so a failed load leaves the player idle.
    pub fn load(&mut self, store: &MacroStore, id: u32) -> Result<(), MacroError> {
        self.close();

        let entry = store.get(id)?;
        let file = File::open(store.trace_path(&entry))?;
        // SAFETY: the trace is only read, and traces are never modified in
        // place once written.
        let mmap = unsafe { Mmap::map(&file)? };
        let header = storage::validate_trace(&mmap[..])?;

        log::info!("Loaded macro {id} ({} frames)", header.frame_count);
        self.trace = Some(TraceView {
            id,
            header,
            mmap,
            _file: file,
        });
        self.state = PlayerState::Loaded;
        Ok(())
    }

    /// Start playback from the first frame. Returns false if there is nothing
    /// loaded to play.
    pub fn start(&mut self, looping: bool) -> bool {
        self.start_at(looping, Instant::now())
    }

    pub fn start_at(&mut self, looping: bool, now: Instant) -> bool {
        if self.frame_count() == 0 {
            return false;
        }
        self.state = PlayerState::Playing;
        self.looping = looping;
        self.cursor = 0;
        self.start = Some(now);
        self.last_report = None;
        log::info!("Playback started (loop={looping}, speed={:.2}x)", self.speed);
        true
    }

    pub fn stop(&mut self) {
        if self.state == PlayerState::Playing {
            log::info!("Playback stopped");
        }
        self.state = PlayerState::Idle;
        self.looping = false;
    }

    /// Release the mapped trace
    pub fn close(&mut self) {
        if let Some(trace) = self.trace.take() {
            log::debug!("Closed macro {}", trace.id);
        }
        self.state = PlayerState::Idle;
        self.looping = false;
        self.cursor = 0;
        self.start = None;
        self.last_report = None;
    }

    /// Set the playback speed, clamped to the preset range
    pub fn set_speed(&mut self, speed: f64) {
        let min = SPEED_PRESETS[0];
        let max = SPEED_PRESETS[SPEED_PRESETS.len() - 1];
        self.speed = if speed.is_nan() {
            DEFAULT_SPEED
        } else {
            speed.clamp(min, max)
        };
        log::info!("Playback speed set to {:.2}x", self.speed);
    }

    /// Advance to the next speed preset, wrapping around. An unknown speed
    /// advances as if it were 1x.
    pub fn cycle_speed(&mut self) {
        let current = SPEED_PRESETS
            .iter()
            .position(|s| (s - self.speed).abs() < 0.01)
            .unwrap_or(2);
        let next = (current + 1) % SPEED_PRESETS.len();
        self.set_speed(SPEED_PRESETS[next]);
    }

    /// Returns the report that is due now
    pub fn get_frame(&mut self) -> Option<RawFrame> {
        self.get_frame_at(Instant::now())
    }

    /// Returns the report that is due at the given instant.
    ///
    /// Output holds the most recently due frame until the next one's
    /// timestamp. Returns None while nothing is due yet and after a
    /// non-looping playback has returned its final frame.
    pub fn get_frame_at(&mut self, now: Instant) -> Option<RawFrame> {
        if self.state != PlayerState::Playing {
            return None;
        }
        let trace = self.trace.as_ref()?;
        let start = self.start?;
        let elapsed_us =
            (now.saturating_duration_since(start).as_micros() as f64 * self.speed) as u64;

        let frame_count = trace.frame_count();
        while self.cursor < frame_count {
            let (timestamp, report) = trace.frame(self.cursor);
            if timestamp > elapsed_us {
                break;
            }
            self.last_report = Some(report);
            self.cursor += 1;
        }

        if self.cursor >= frame_count {
            if self.looping {
                log::trace!("Playback looped");
                self.cursor = 0;
                self.start = Some(now);
            } else {
                log::info!("Playback finished");
                self.state = PlayerState::Idle;
                self.looping = false;
                return self.last_report.take();
            }
        }

        self.last_report
    }
}

impl Drop for MacroPlayer {
    fn drop(&mut self) {
        self.close();
    }
}
