//! Radial stick calibration and trigger remapping.
//!
//! The sticks of the controller do not travel in a circle: the maximum
//! radius reached at full tilt depends on the direction. Each stick carries a
//! table of 32 measured maximum radii, one per 11.25° sector, which is used to
//! rescale the stick magnitude so that full tilt reads 100 in every direction.
use std::f64::consts::PI;

use thiserror::Error;

use crate::drivers::procon2::hid_report::{decode, RawFrame};

/// Number of samples in a calibration table
pub const CALIBRATION_POINTS: usize = 32;

/// Raw stick magnitude is divided by this before the deadzone check
const MAGNITUDE_DIVISOR: f64 = 1.3;

/// Calibrated output is clamped to +/- this value
pub const STICK_RANGE: f64 = 100.0;

/// Center of a 12-bit axis
pub const STICK_CENTER: u16 = 2048;

/// Measured trigger travel
pub const TRIGGER_MIN_IN: u8 = 36;
pub const TRIGGER_MAX_IN: u8 = 240;

/// Measured radii of the left stick
pub const LEFT_STICK_RADII: [f64; CALIBRATION_POINTS] = [
    61.28, 59.10, 59.32, 61.42, 64.61, 60.89, 58.93, 58.86, 57.96, 54.91, 53.94, 55.08, 58.76,
    55.50, 52.94, 53.47, 56.88, 54.62, 54.06, 55.79, 59.53, 58.33, 56.91, 58.23, 60.40, 61.90,
    61.76, 63.32, 68.50, 63.34, 61.14, 60.96,
];

/// Measured radii of the right stick
pub const RIGHT_STICK_RADII: [f64; CALIBRATION_POINTS] = [
    54.74, 52.52, 52.24, 54.58, 58.28, 55.75, 54.01, 54.52, 55.03, 53.14, 52.31, 53.07, 56.86,
    52.77, 51.99, 52.16, 53.86, 52.02, 51.43, 53.31, 56.98, 53.29, 52.09, 52.24, 55.01, 53.96,
    53.79, 56.05, 59.98, 56.49, 54.20, 54.46,
];

/// Possible errors parsing a calibration table
#[derive(Error, Debug, PartialEq)]
pub enum CalibrationError {
    #[error("expected {CALIBRATION_POINTS} calibration points, got {0}")]
    WrongLength(usize),
    #[error("invalid calibration point `{0}`")]
    InvalidPoint(String),
    #[error("calibration point {0} must be positive")]
    NonPositive(usize),
}

/// Stick calibrator with 32 radial calibration points and a deadzone
#[derive(Debug, Clone, PartialEq)]
pub struct StickCalibrator {
    radii: [f64; CALIBRATION_POINTS],
    deadzone: f64,
}

impl StickCalibrator {
    pub fn new(radii: [f64; CALIBRATION_POINTS], deadzone: f64) -> Self {
        Self { radii, deadzone }
    }

    /// Parse a whitespace separated table of 32 radii, e.g. "61.28 59.10 ..."
    pub fn from_table_str(table: &str, deadzone: f64) -> Result<Self, CalibrationError> {
        let points: Vec<&str> = table.split_whitespace().collect();
        if points.len() != CALIBRATION_POINTS {
            return Err(CalibrationError::WrongLength(points.len()));
        }

        let mut radii = [0.0; CALIBRATION_POINTS];
        for (i, point) in points.iter().enumerate() {
            let value: f64 = point
                .parse()
                .map_err(|_| CalibrationError::InvalidPoint(point.to_string()))?;
            if value <= 0.0 {
                return Err(CalibrationError::NonPositive(i));
            }
            radii[i] = value;
        }

        Ok(Self::new(radii, deadzone))
    }

    pub fn radii(&self) -> &[f64; CALIBRATION_POINTS] {
        &self.radii
    }

    pub fn deadzone(&self) -> f64 {
        self.deadzone
    }

    /// Calibrate a centered stick position.
    ///
    /// Input is the raw position minus the stick center, roughly
    /// [-2048, 2048]. Output is roughly [-100, 100] at full tilt.
    pub fn calibrate(&self, x: f64, y: f64) -> (f64, f64) {
        let magnitude = (x * x + y * y).sqrt() / MAGNITUDE_DIVISOR;
        if magnitude < self.deadzone {
            return (0.0, 0.0);
        }

        let mut angle = y.atan2(x);
        if angle < 0.0 {
            angle += 2.0 * PI;
        }

        let position = angle / (2.0 * PI) * CALIBRATION_POINTS as f64;
        let index1 = (position.floor() as usize) % CALIBRATION_POINTS;
        let index2 = (index1 + 1) % CALIBRATION_POINTS;
        let fraction = position - position.floor();

        let r1 = self.radii[index1];
        let r2 = self.radii[index2];
        let radius = r1 + (r2 - r1) * fraction;

        let scale_factor = STICK_RANGE / radius;
        let corrected_magnitude = magnitude * scale_factor;

        (
            corrected_magnitude * angle.cos(),
            corrected_magnitude * angle.sin(),
        )
    }

    /// Calibrate a raw 12-bit stick pair around the given center and clamp
    /// the result to [-100, 100].
    pub fn calibrate_raw(&self, raw: (u16, u16), center: (u16, u16)) -> (f64, f64) {
        let x = raw.0 as f64 - center.0 as f64;
        let y = raw.1 as f64 - center.1 as f64;
        let (x, y) = self.calibrate(x, y);
        (
            x.clamp(-STICK_RANGE, STICK_RANGE),
            y.clamp(-STICK_RANGE, STICK_RANGE),
        )
    }
}

/// Stick centers measured while the sticks are at rest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickCenters {
    pub left: (u16, u16),
    pub right: (u16, u16),
}

impl Default for StickCenters {
    fn default() -> Self {
        Self {
            left: (STICK_CENTER, STICK_CENTER),
            right: (STICK_CENTER, STICK_CENTER),
        }
    }
}

/// Average the stick positions of a set of idle reports.
pub fn auto_calibrate_centers(frames: &[RawFrame]) -> StickCenters {
    if frames.is_empty() {
        return StickCenters::default();
    }

    let mut sums = [0u64; 4];
    for frame in frames {
        let state = decode(frame);
        sums[0] += state.left_stick_raw.0 as u64;
        sums[1] += state.left_stick_raw.1 as u64;
        sums[2] += state.right_stick_raw.0 as u64;
        sums[3] += state.right_stick_raw.1 as u64;
    }

    let n = frames.len() as u64;
    StickCenters {
        left: ((sums[0] / n) as u16, (sums[1] / n) as u16),
        right: ((sums[2] / n) as u16, (sums[3] / n) as u16),
    }
}

/// Remap a raw trigger value from its measured travel to [0, 255]
pub fn remap_trigger(value: u8) -> u8 {
    let clamped = value.clamp(TRIGGER_MIN_IN, TRIGGER_MAX_IN);
    let in_range = (TRIGGER_MAX_IN - TRIGGER_MIN_IN) as f64;
    let percentage = (clamped - TRIGGER_MIN_IN) as f64 / in_range;
    (percentage * u8::MAX as f64) as u8
}
