use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

use crate::client::EvolutionConfig;
use crate::phone::PhoneFormatter;
use crate::session::ReconnectPolicy;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub phone: PhoneConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    #[serde(default)]
    pub bridge: EvolutionConfig,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_seconds: u64,
    /// Upper bound on request bodies; documents travel base64-encoded inline.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            keep_alive_interval_seconds: default_keep_alive_interval(),
            max_body_bytes: default_max_body_bytes(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9999
}

fn default_request_timeout() -> u64 {
    120
}

fn default_keep_alive_interval() -> u64 {
    15
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_event_capacity() -> usize {
    64
}

// ============================================================================
// PhoneConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PhoneConfig {
    /// Replaces a leading `0` during normalization.
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(default = "default_address_suffix")]
    pub address_suffix: String,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            country_code: default_country_code(),
            address_suffix: default_address_suffix(),
        }
    }
}

impl PhoneConfig {
    pub fn formatter(&self) -> PhoneFormatter {
        PhoneFormatter::new(&self.country_code, &self.address_suffix)
    }
}

fn default_country_code() -> String {
    PhoneFormatter::DEFAULT_COUNTRY_CODE.to_string()
}

fn default_address_suffix() -> String {
    PhoneFormatter::DEFAULT_ADDRESS_SUFFIX.to_string()
}

// ============================================================================
// StagingConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StagingConfig {
    #[serde(default = "default_staging_dir")]
    pub dir: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: default_staging_dir(),
        }
    }
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./tmppdf")
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

// ============================================================================
// Tests
// ============================================================================
