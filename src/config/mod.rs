pub mod path;


use std::{
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    bridge::StickCalibration,
    input::calibration::{CalibrationError, StickCalibrator, LEFT_STICK_RADII, RIGHT_STICK_RADII},
};

/// Represents all possible errors loading a [BridgeConfig]
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Could not read: {0}")]
    IoError(#[from] io::Error),
    #[error("Unable to deserialize: {0}")]
    DeserializeError(#[from] serde_yaml::Error),
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    #[error("Invalid {stick} stick calibration: {source}")]
    Calibration {
        stick: &'static str,
        source: CalibrationError,
    },
}

/// Message bus the control interface is exported on
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    #[default]
    System,
    Session,
}

/// Runtime configuration of the bridge
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct BridgeConfig {
    /// Hidraw path of the controller. Searched by vendor and product id
    /// when unset.
    pub device_path: Option<String>,
    /// Directory holding the macro catalog and trace files
    pub macros_dir: Option<PathBuf>,
    /// Calibrated stick magnitude below which the stick reads as centered
    pub deadzone: f64,
    /// Whitespace separated table of 32 maximum radii for the left stick
    pub left_stick: Option<String>,
    /// Whitespace separated table of 32 maximum radii for the right stick
    pub right_stick: Option<String>,
    /// Number of idle reports averaged to find the stick centers at startup
    pub center_samples: usize,
    /// Interval between state publications on the control interface
    pub publish_interval_ms: u64,
    pub dbus: BusKind,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_path: None,
            macros_dir: None,
            deadzone: 10.0,
            left_stick: None,
            right_stick: None,
            center_samples: 20,
            publish_interval_ms: 200,
            dbus: BusKind::default(),
        }
    }
}

impl BridgeConfig {
    /// Load a [BridgeConfig] from the given YAML string
    pub fn from_yaml(content: &str) -> Result<BridgeConfig, LoadError> {
        // An empty document is valid and means "all defaults"
        if content.trim().is_empty() {
            return Ok(BridgeConfig::default());
        }
        let config: BridgeConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that deserialize but cannot be used
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.publish_interval_ms == 0 {
            return Err(LoadError::InvalidValue {
                field: "publish_interval_ms",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// Load a [BridgeConfig] from the given YAML file
    pub fn from_yaml_path(path: &Path) -> Result<BridgeConfig, LoadError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load the config from the first config file found, or use the defaults
    pub fn load(explicit: Option<&Path>) -> Result<BridgeConfig, LoadError> {
        let Some(path) = path::find_config_file(explicit) else {
            return Ok(BridgeConfig::default());
        };
        log::info!("Loading config from {path:?}");
        Self::from_yaml_path(&path)
    }

    /// Directory for saved macros
    pub fn macros_dir(&self) -> PathBuf {
        self.macros_dir.clone().unwrap_or_else(path::get_macros_path)
    }

    /// Build the stick calibrators from the configured tables, falling back
    /// to the built-in measurements.
    pub fn calibration(&self) -> Result<StickCalibration, LoadError> {
        let left = match self.left_stick.as_deref() {
            Some(table) => StickCalibrator::from_table_str(table, self.deadzone).map_err(
                |source| LoadError::Calibration {
                    stick: "left",
                    source,
                },
            )?,
            None => StickCalibrator::new(LEFT_STICK_RADII, self.deadzone),
        };
        let right = match self.right_stick.as_deref() {
            Some(table) => StickCalibrator::from_table_str(table, self.deadzone).map_err(
                |source| LoadError::Calibration {
                    stick: "right",
                    source,
                },
            )?,
            None => StickCalibrator::new(RIGHT_STICK_RADII, self.deadzone),
        };
        Ok(StickCalibration { left, right })
    }
}
