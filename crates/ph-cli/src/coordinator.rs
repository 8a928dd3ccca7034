//! One remote helper run: reach the proxy, then hand off to the delegate

use std::path::Path;

use anyhow::{Context, Result};
use tokio::net::TcpStream;

use ph_core::config::ConfigFile;
use ph_core::{SocketError, SocketGuard};

use crate::connect::{connect, DaemonLauncher};
use crate::delegate::{Delegate, DelegateOutcome};
use crate::remote::RemoteInvocation;

/// Everything needed to serve remote helper invocations
#[derive(Debug, Clone)]
pub struct Coordinator {
    socket: SocketGuard,
    launcher: DaemonLauncher,
    delegate: String,
}

impl Coordinator {
    /// Create a coordinator from its parts
    pub fn new(socket: SocketGuard, launcher: DaemonLauncher, delegate: impl Into<String>) -> Self {
        Self {
            socket,
            launcher,
            delegate: delegate.into(),
        }
    }

    /// Build from a loaded config file
    ///
    /// A spawned daemon gets the same config file and socket directory.
    pub fn from_config(config: &ConfigFile, config_path: Option<&Path>) -> Result<Self, SocketError> {
        let socket = config.socket_guard()?;

        let mut launcher = DaemonLauncher::resolve(&config.client);
        if let Some(path) = config_path {
            launcher = launcher.arg("--config").arg(path);
        }
        if let Some(dir) = &config.socket_dir {
            launcher = launcher.arg("--socket-dir").arg(dir);
        }

        Ok(Self::new(socket, launcher, config.client.delegate.clone()))
    }

    /// Run the delegate through the proxy
    ///
    /// The socket session and a connection to the proxy listener stay open
    /// until the delegate exits, keeping the daemon from going idle.
    pub async fn run(&self, invocation: &RemoteInvocation) -> Result<DelegateOutcome> {
        let session = connect(&self.socket, &self.launcher)
            .await
            .context("Failed to reach the persistent-https proxy")?;

        let proxy = session.addresses().select(invocation.insecure).to_string();
        let _reservation = TcpStream::connect(&proxy)
            .await
            .with_context(|| format!("Failed to connect to proxy at {}", proxy))?;
        tracing::debug!(%proxy, insecure = invocation.insecure, "Proxy resolved");

        let delegate = Delegate::new(
            self.delegate.clone(),
            invocation.delegate_args(),
            proxy,
            invocation.insecure,
        );
        let outcome = delegate
            .run()
            .await
            .with_context(|| format!("Failed to run {}", self.delegate))?;

        drop(session);
        Ok(outcome)
    }
}
