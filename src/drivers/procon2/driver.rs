use std::{error::Error, ffi::CString, thread, time::Duration};

use hidapi::{HidApi, HidDevice};

use crate::input::source::{FrameSource, SourceError};

use super::hid_report::{decode, RawFrame, REPORT_SIZE};

// Hardware IDs
pub const VID: u16 = 0x057e;
pub const PID: u16 = 0x2069;

/// Timeout for a single blocking read. The controller streams reports
/// continuously, so an empty read means it went away.
const HID_TIMEOUT: i32 = 5000;
/// Attempts made to open the hidraw node after the init sequence
const OPEN_ATTEMPTS: u32 = 10;
const OPEN_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Switch 2 Pro Controller hidraw driver. Expects the controller to already
/// be switched into HID reporting mode.
pub struct Driver {
    device: HidDevice,
}

impl Driver {
    /// Open the device at the given hidraw path
    pub fn new(path: String) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let path = CString::new(path)?;
        let api = HidApi::new()?;
        let device = api.open_path(&path)?;
        let info = device.get_device_info()?;
        if info.vendor_id() != VID || info.product_id() != PID {
            return Err(format!("Device '{path:?}' is not a Pro Controller 2").into());
        }

        Ok(Self { device })
    }

    /// Open the first matching controller, retrying while the kernel driver
    /// brings the hidraw node up.
    pub fn open() -> Result<Self, Box<dyn Error + Send + Sync>> {
        let api = HidApi::new()?;
        let mut attempt = 1;
        loop {
            match api.open(VID, PID) {
                Ok(device) => {
                    log::info!("Opened HID device {VID:04x}:{PID:04x}");
                    return Ok(Self { device });
                }
                Err(e) if attempt < OPEN_ATTEMPTS => {
                    log::warn!("Attempt {attempt}/{OPEN_ATTEMPTS} to open HID device failed: {e}");
                    attempt += 1;
                    thread::sleep(OPEN_RETRY_DELAY);
                }
                Err(e) => {
                    return Err(
                        format!("Could not open HID device after {OPEN_ATTEMPTS} attempts: {e}")
                            .into(),
                    );
                }
            }
        }
    }

    /// Poll the device and read one input report
    pub fn poll(&mut self) -> Result<RawFrame, SourceError> {
        let mut buf = [0; REPORT_SIZE];
        let bytes_read = self.device.read_timeout(&mut buf[..], HID_TIMEOUT)?;

        if bytes_read == 0 {
            return Err(SourceError::Disconnected);
        }
        if bytes_read != REPORT_SIZE {
            return Err(SourceError::ShortRead {
                read: bytes_read,
                expected: REPORT_SIZE,
            });
        }

        log::trace!("Input report: {}", decode(&buf));

        Ok(buf)
    }
}

impl FrameSource for Driver {
    fn read_frame(&mut self) -> Result<RawFrame, SourceError> {
        self.poll()
    }
}
