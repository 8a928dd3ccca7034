//! Core error types for persistent-https

use std::path::PathBuf;

use ph_protocol::HandshakeError;
use thiserror::Error;

/// Top-level error type for the persistent-https crates
#[derive(Error, Debug)]
pub enum PhError {
    /// Socket error
    #[error("Socket error: {0}")]
    Socket(#[from] SocketError),

    /// Handshake error
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Proxy daemon could not be started
    #[error("Failed to start proxy: {0}")]
    Spawn(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the permission-checked proxy socket
#[derive(Error, Debug)]
pub enum SocketError {
    /// Socket or its directory does not exist
    #[error("No such socket: {0:?}")]
    NotFound(PathBuf),

    /// Nothing is accepting on the socket
    #[error("Connection refused: {0:?}")]
    ConnectionRefused(PathBuf),

    /// Something is already bound to the socket path
    #[error("Socket already in use: {0:?}")]
    AddrInUse(PathBuf),

    /// Directory ownership or mode allows other users in
    #[error("Insecure socket directory {path:?}: {reason}")]
    InsecureDirectory { path: PathBuf, reason: String },

    /// Home directory could not be determined
    #[error("Could not determine home directory")]
    NoHomeDir,

    /// Other I/O failure
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SocketError {
    /// True when the failure means no daemon is serving, so spawning one may help
    pub fn is_not_running(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::ConnectionRefused(_))
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
