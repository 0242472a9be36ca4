pub mod calibration;
pub mod combo;
pub mod source;
pub mod target;
