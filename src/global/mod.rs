use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "ssjitsi";
const LOCAL_CONFIG: &str = "ssjitsi.yaml";

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .context("Unable to determine config directory")
}

pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.yaml"))
}

pub fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = dirs::data_dir() {
        return Ok(dir.join(APP_DIR));
    }
    if let Some(home) = dirs::home_dir() {
        return Ok(home.join(".local").join("share").join(APP_DIR));
    }
    Err(anyhow!("Unable to determine data directory"))
}

/// Where recordings go for bots that do not set a data directory.
pub fn recordings_dir() -> PathBuf {
    data_dir()
        .map(|d| d.join("recordings"))
        .unwrap_or_else(|_| PathBuf::from("data"))
}

/// Pick the configuration file: an explicit path wins, then `./ssjitsi.yaml`,
/// then the per-user config file.
pub fn resolve_config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Ok(local);
    }
    config_file()
}
