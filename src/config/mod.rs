//! Service configuration, read from YAML.
//!
//! Bot keys keep the capitalized names used by existing deployments
//! (`Room`, `BotName`, `JitsiServer`, `JWTAppID`, ...).

use crate::bot::AuthMethod;
use crate::global;
use crate::recording::DEFAULT_EXTENSION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const DEFAULT_HTTP: &str = ":8080";
const DEFAULT_CAPTURE_SCRIPT: &str = "script.js";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid bot #{index}: {reason}")]
    InvalidBot { index: usize, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address; Go-style `":8080"` binds all interfaces.
    pub http: String,
    pub web_username: String,
    pub web_password: String,
    /// In-page capture script, read on every bot start.
    pub capture_script: PathBuf,
    /// Browser executable; looked up in PATH when unset.
    pub browser: Option<PathBuf>,
    pub bots: Vec<BotConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: DEFAULT_HTTP.to_string(),
            web_username: String::new(),
            web_password: String::new(),
            capture_script: PathBuf::from(DEFAULT_CAPTURE_SCRIPT),
            browser: None,
            bots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(rename = "Room")]
    pub room: String,
    #[serde(rename = "BotName", default = "default_bot_name")]
    pub bot_name: String,
    #[serde(rename = "DataDir", default)]
    pub data_dir: PathBuf,
    #[serde(rename = "JitsiServer")]
    pub server: String,
    #[serde(rename = "Username", default)]
    pub username: String,
    #[serde(rename = "Pass", default)]
    pub password: String,
    #[serde(rename = "JWTAppID", default)]
    pub jwt_app_id: String,
    #[serde(rename = "JWTAppSecret", default)]
    pub jwt_app_secret: String,
    #[serde(rename = "Headless", default)]
    pub headless: bool,
    #[serde(rename = "RecordingExtension", default = "default_extension")]
    pub recording_extension: String,
}

fn default_bot_name() -> String {
    "SSJitsiBot".to_string()
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

impl BotConfig {
    pub fn new(room: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            bot_name: default_bot_name(),
            data_dir: PathBuf::new(),
            server: server.into(),
            username: String::new(),
            password: String::new(),
            jwt_app_id: String::new(),
            jwt_app_secret: String::new(),
            headless: false,
            recording_extension: default_extension(),
        }
    }

    /// How this bot gets into the meeting.
    pub fn auth_method(&self) -> AuthMethod {
        if !self.jwt_app_id.is_empty() && !self.jwt_app_secret.is_empty() {
            AuthMethod::Jwt
        } else if !self.username.is_empty() || !self.password.is_empty() {
            AuthMethod::Password
        } else {
            AuthMethod::None
        }
    }

    fn validate(&mut self, index: usize) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidBot {
            index,
            reason: reason.to_string(),
        };

        if self.room.trim().is_empty() {
            return Err(invalid("Room is required"));
        }
        if self.server.trim().is_empty() {
            return Err(invalid("JitsiServer is required"));
        }
        if url::Url::parse(&self.server).is_err() {
            return Err(invalid(&format!(
                "JitsiServer {:?} is not an absolute URL",
                self.server
            )));
        }
        if self.data_dir.as_os_str().is_empty() {
            self.data_dir = global::recordings_dir();
        }
        Ok(())
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_yaml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;

        info!("Loaded config from {:?} ({} bots)", path, config.bots.len());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })?;

        for (index, bot) in config.bots.iter_mut().enumerate() {
            bot.validate(index)?;
        }
        Ok(config)
    }

    /// Socket address to bind, expanding `":port"` to all interfaces.
    pub fn bind_addr(&self) -> String {
        let http = self.http.trim();
        if http.is_empty() {
            format!("0.0.0.0{}", DEFAULT_HTTP)
        } else if http.starts_with(':') {
            format!("0.0.0.0{}", http)
        } else {
            http.to_string()
        }
    }

    /// Control-plane credentials, if both are configured.
    pub fn credentials(&self) -> Option<(String, String)> {
        if self.web_username.is_empty() || self.web_password.is_empty() {
            return None;
        }
        Some((self.web_username.clone(), self.web_password.clone()))
    }
}
