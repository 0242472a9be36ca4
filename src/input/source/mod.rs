//! Physical input sources produce one fixed-size raw report per blocking read.
use thiserror::Error;

use crate::drivers::procon2::hid_report::RawFrame;

/// Possible errors reading from a physical input source. Every variant is
/// fatal to the bridge loop.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("device disconnected")]
    Disconnected,
    #[error("short read from device: {read}/{expected} bytes")]
    ShortRead { read: usize, expected: usize },
    #[error("hid error: {0}")]
    Hid(#[from] hidapi::HidError),
}

/// A [FrameSource] supplies raw input reports on a blocking pull. Returning
/// [SourceError::Disconnected] signals that no more data will arrive.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<RawFrame, SourceError>;
}
