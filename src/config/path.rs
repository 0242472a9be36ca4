//! Module for locating padrelay config and data files

use std::path::{Path, PathBuf};

/// Name of the config file in every config directory
pub const CONFIG_FILE: &str = "config.yaml";

/// System config path to use if none can be found with XDG
const FALLBACK_CONFIG_PATH: &str = "/etc/padrelay/config.yaml";

/// Macro storage path to use if the XDG data home cannot be determined
const FALLBACK_MACROS_PATH: &str = "/var/lib/padrelay/macros";

fn base_dirs() -> Option<xdg::BaseDirectories> {
    match xdg::BaseDirectories::with_prefix("padrelay") {
        Ok(dirs) => Some(dirs),
        Err(e) => {
            log::warn!("Unable to determine XDG base directories: {e}");
            None
        }
    }
}

/// Returns the config file to load, in preference order: the explicitly
/// given path, the user's XDG config file, then the system config file.
/// Returns None if no config file exists and none was given.
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Some(path) = base_dirs().and_then(|dirs| dirs.find_config_file(CONFIG_FILE)) {
        return Some(path);
    }

    let fallback = PathBuf::from(FALLBACK_CONFIG_PATH);
    if fallback.exists() {
        return Some(fallback);
    }

    log::debug!("No config file found. Using defaults.");
    None
}

/// Returns the default directory for saved macros
/// (e.g. "~/.local/share/padrelay/macros")
pub fn get_macros_path() -> PathBuf {
    let Some(dirs) = base_dirs() else {
        return PathBuf::from(FALLBACK_MACROS_PATH);
    };
    dirs.get_data_home().join("macros")
}
