//! Configuration management for persistent-https

mod client;
mod proxy;
pub mod serde_utils;

pub use client::ClientConfig;
pub use proxy::ProxyConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::socket::SocketGuard;

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("persistent-https")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Directory holding the proxy socket (defaults to `~/.git-credential-cache`)
    pub socket_dir: Option<PathBuf>,

    /// `[proxy]` section
    pub proxy: ProxyConfig,

    /// `[client]` section
    pub client: ClientConfig,
}

impl ConfigFile {
    /// Socket guard for the configured (or default) directory
    pub fn socket_guard(&self) -> Result<SocketGuard, crate::SocketError> {
        match &self.socket_dir {
            Some(dir) => Ok(SocketGuard::new(dir)),
            None => SocketGuard::default_for_user(),
        }
    }
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Load an explicit config file, or the default one if it exists
///
/// An explicit path must exist; a missing default file yields defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let default_path = default_config_path();
            if default_path.exists() {
                load_config(&default_path)
            } else {
                tracing::debug!("No config file at {:?}, using defaults", default_path);
                Ok(ConfigFile::default())
            }
        }
    }
}
