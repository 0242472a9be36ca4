pub mod driver;
pub mod hid_report;
