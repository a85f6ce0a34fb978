//! Host configuration.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file at all) yields a usable configuration.

use crate::error::{HostError, Result};
use crate::utils::add_ice_url_scheme;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

// Logging is on for debug builds and off for release builds unless the
// config file says otherwise.
#[cfg(debug_assertions)]
pub const LOGGING_ENABLED: bool = true;

#[cfg(not(debug_assertions))]
pub const LOGGING_ENABLED: bool = false;

pub const ENV_SIGNALING_URL: &str = "SHAREHOST_SIGNALING_URL";
pub const ENV_RELAY_API_URL: &str = "SHAREHOST_RELAY_API_URL";

/// ICE server entry as supplied by the operator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(HostError::Config("server URL cannot be empty".into()));
        }
        if self.r#type == "turn" && (self.username.is_none() || self.credential.is_none()) {
            return Err(HostError::Config(
                "TURN servers require username and credential".into(),
            ));
        }
        Ok(())
    }

    /// URL with a `stun:`/`turn:` scheme guaranteed.
    pub fn normalized_url(&self) -> String {
        add_ice_url_scheme(self)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub enabled: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: LOGGING_ENABLED,
            filter: "sharehost=info,sharehost_lib=info,webrtc=warn".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    pub signaling_url: String,
    pub relay_api_url: String,
    pub stun_urls: Vec<String>,
    pub turn: Option<ServerConfig>,
    pub control_grant_delay_ms: u64,
    /// `None` retries renegotiation forever.
    pub max_renegotiations: Option<u32>,
    pub connect_timeout_secs: u64,
    pub capture_width: u32,
    pub capture_height: u32,
    pub log: LogConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://127.0.0.1:8080/ws".into(),
            relay_api_url: "http://127.0.0.1:8080/api".into(),
            stun_urls: vec![
                "stun:stun.l.google.com:19302".into(),
                "stun:stun1.l.google.com:19302".into(),
            ],
            turn: None,
            control_grant_delay_ms: 1000,
            max_renegotiations: None,
            connect_timeout_secs: 15,
            capture_width: 1920,
            capture_height: 1080,
            log: LogConfig::default(),
        }
    }
}

impl HostConfig {
    /// Load from a TOML file, or defaults when `path` is `None`.
    /// Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    HostError::Config(format!("failed to read {}: {e}", path.display()))
                })?;
                let config = Self::from_toml(&content)?;
                info!("loaded config from {}", path.display());
                config
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HostError::Config(format!("failed to parse TOML: {e}")))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_SIGNALING_URL) {
            self.signaling_url = url;
        }
        if let Ok(url) = std::env::var(ENV_RELAY_API_URL) {
            self.relay_api_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.signaling_url.is_empty() {
            return Err(HostError::Config("signaling_url cannot be empty".into()));
        }
        if self.relay_api_url.is_empty() {
            return Err(HostError::Config("relay_api_url cannot be empty".into()));
        }
        if let Some(turn) = &self.turn {
            turn.validate()?;
        }
        Ok(())
    }

    pub fn control_grant_delay(&self) -> Duration {
        Duration::from_millis(self.control_grant_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
