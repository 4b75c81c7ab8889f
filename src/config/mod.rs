//! Configuration discovery for the `provman` binary.
//!
//! Two things are located here:
//!
//! - the **target cache directory** that receives installed providers,
//!   `PROVMAN_CACHE_DIR` or `.provman/providers` under the working directory
//! - the **settings file** (`provman.toml`), `PROVMAN_CONFIG_PATH` or
//!   `~/.provman/config.toml`, described in [`settings`]
//!
//! A missing settings file is not an error; every option has a default.

use std::path::PathBuf;

use anyhow::Result;

pub mod settings;

pub use settings::{InstallationMethod, Settings};

/// Directory that receives installed providers for the current project.
///
/// # Errors
///
/// Returns an error if the working directory cannot be determined.
pub fn get_cache_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("PROVMAN_CACHE_DIR") {
        return Ok(PathBuf::from(shellexpand::tilde(&dir).as_ref()));
    }
    Ok(std::env::current_dir()?.join(".provman").join("providers"))
}

/// Location of the settings file.
///
/// # Errors
///
/// Returns an error if neither `PROVMAN_CONFIG_PATH` is set nor the home
/// directory can be determined.
pub fn default_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("PROVMAN_CONFIG_PATH") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).as_ref()));
    }
    Ok(provman_home()?.join("config.toml"))
}

/// `~/.provman`, or the local data directory on Windows.
pub(crate) fn provman_home() -> Result<PathBuf> {
    let dir = if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
            .join("provman")
    } else {
        dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
            .join(".provman")
    };
    Ok(dir)
}
