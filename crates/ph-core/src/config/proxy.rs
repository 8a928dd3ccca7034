//! Proxy daemon configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_secs, option_duration_secs};

/// Configuration for the proxy daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Shut down after this long without any session
    #[serde(with = "duration_secs")]
    pub max_idle_duration: Duration,

    /// How often to check whether the binary on disk was replaced
    #[serde(with = "duration_secs")]
    pub poll_update_interval: Duration,

    /// Upper bound on how long a session may stay open after the handshake
    #[serde(
        with = "option_duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub session_hold_timeout: Option<Duration>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_idle_duration: Duration::from_secs(24 * 60 * 60),
            poll_update_interval: Duration::from_secs(15 * 60),
            session_hold_timeout: None,
        }
    }
}
