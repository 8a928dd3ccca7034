//! Client coordinator configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Remote helper that performs the actual fetch/push
pub const DEFAULT_DELEGATE: &str = "git-remote-http";

/// Configuration for the client coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Proxy daemon binary to spawn (defaults to a sibling of the client, then `PATH`)
    pub proxy_bin: Option<PathBuf>,

    /// Delegate process run with the resolved proxy address
    pub delegate: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_bin: None,
            delegate: DEFAULT_DELEGATE.to_string(),
        }
    }
}
