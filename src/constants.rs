pub const BUS_NAME: &str = "org.padrelay.Bridge";
pub const BUS_PATH: &str = "/org/padrelay/Bridge";
