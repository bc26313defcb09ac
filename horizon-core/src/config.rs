//! Configuration management for horizon
//!
//! Config files are stored in platform-appropriate locations:
//! - Linux: ~/.config/horizon/
//! - macOS: ~/Library/Application Support/horizon/
//! - Windows: %APPDATA%\horizon\
//!
//! Passwords never live here; the caller supplies them per process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    NoDirFound,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Vendor endpoints and connection tuning
    #[serde(default)]
    pub service: ServiceConfig,

    /// Channel lineup lookup
    #[serde(default)]
    pub lineup: LineupConfig,

    /// Account settings (no secrets)
    #[serde(default)]
    pub account: AccountConfig,
}

/// Endpoints and timeouts for the session and realtime layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Authorization endpoint (credentials -> session)
    #[serde(default = "default_session_url")]
    pub session_url: String,

    /// Connection token endpoint (session -> token)
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// MQTT-over-WebSocket broker
    #[serde(default = "default_broker_url")]
    pub broker_url: String,

    /// Value of the `x-device-code` header on authorization
    #[serde(default = "default_device_code")]
    pub device_code: String,

    /// Human-readable origin placed in every outbound command
    #[serde(default = "default_client_label")]
    pub client_label: String,

    /// Transport connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Bound on subscribe-ack and readiness waits; unbounded when unset
    pub handshake_timeout_secs: Option<u64>,

    /// MQTT keep-alive in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

/// Channel lineup lookup parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupConfig {
    #[serde(default = "default_channels_url")]
    pub channels_url: String,

    #[serde(default = "default_city_id")]
    pub city_id: u32,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_product_class")]
    pub product_class: String,
}

/// Account configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Username used when none is given on the environment
    pub username: Option<String>,
}

// Default value functions
fn default_session_url() -> String {
    "https://prod.spark.ziggogo.tv/auth-service/v1/authorization".to_string()
}
fn default_token_url() -> String {
    "https://prod.spark.ziggogo.tv/auth-service/v1/mqtt/token".to_string()
}
fn default_broker_url() -> String {
    "wss://obomsg.prod.nl.horizon.tv:443/mqtt".to_string()
}
fn default_device_code() -> String {
    "web".to_string()
}
fn default_client_label() -> String {
    "Horizon Remote".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_keep_alive() -> u64 {
    30
}
fn default_http_timeout() -> u64 {
    30
}
fn default_channels_url() -> String {
    "https://prod.spark.ziggogo.tv/eng/web/linear-service/v2/channels".to_string()
}
fn default_city_id() -> u32 {
    65535
}
fn default_language() -> String {
    "nl".to_string()
}
fn default_product_class() -> String {
    "Orion-DASH".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            session_url: default_session_url(),
            token_url: default_token_url(),
            broker_url: default_broker_url(),
            device_code: default_device_code(),
            client_label: default_client_label(),
            connect_timeout_secs: default_connect_timeout(),
            handshake_timeout_secs: None,
            keep_alive_secs: default_keep_alive(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for LineupConfig {
    fn default() -> Self {
        Self {
            channels_url: default_channels_url(),
            city_id: default_city_id(),
            language: default_language(),
            product_class: default_product_class(),
        }
    }
}

impl ServiceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_secs.map(Duration::from_secs)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Config {
    /// Get config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join("horizon"))
            .ok_or(ConfigError::NoDirFound)
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from default location
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load config from specific path
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to specific path
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
