//! Finding the proxy daemon, starting it when nobody answers
//!
//! The daemon is started detached in its own process group so it outlives
//! this helper and is not hit by the terminal's ^C. Its first stdout line
//! tells us it is safe to dial.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixStream;
use tokio::process::Command;

use ph_core::config::ClientConfig;
use ph_core::{PhError, SocketGuard};
use ph_protocol::{client_handshake, is_ready_line, AddressPair};

/// Name of the daemon binary, installed next to the helper
pub const PROXY_BINARY_NAME: &str = "git-remote-persistent-https--proxy";

/// How long a freshly spawned daemon has to report ready
pub const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// How to start the daemon
#[derive(Debug, Clone)]
pub struct DaemonLauncher {
    binary: PathBuf,
    args: Vec<OsString>,
    ready_timeout: Duration,
}

impl DaemonLauncher {
    /// Launch a specific binary with no extra arguments
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            ready_timeout: READY_TIMEOUT,
        }
    }

    /// Pick the daemon binary for this client
    ///
    /// `proxy_bin` from the config wins, then a daemon installed next to
    /// this executable, then whatever `PATH` finds.
    pub fn resolve(config: &ClientConfig) -> Self {
        let binary = config
            .proxy_bin
            .clone()
            .or_else(sibling_binary)
            .unwrap_or_else(|| PathBuf::from(PROXY_BINARY_NAME));
        Self::new(binary)
    }

    /// Pass an argument through to the daemon
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Override how long to wait for the ready line
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Binary this launcher runs
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Spawn the daemon and wait for its ready line
    pub async fn launch(&self) -> Result<(), PhError> {
        tracing::info!("Starting proxy {:?}", self.binary);

        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|e| PhError::Spawn(format!("{:?}: {}", self.binary, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PhError::Spawn("proxy stdout was not captured".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        match tokio::time::timeout(self.ready_timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) if is_ready_line(&line) => {
                tracing::debug!(pid = ?child.id(), "Proxy reported ready");
                Ok(())
            }
            Ok(Ok(Some(line))) => Err(PhError::Spawn(format!(
                "unexpected output from proxy: {:?}",
                line
            ))),
            Ok(Ok(None)) => Err(PhError::Spawn(
                "proxy exited before reporting ready".to_string(),
            )),
            Ok(Err(e)) => Err(PhError::Io(e)),
            Err(_) => Err(PhError::Spawn(format!(
                "proxy not ready after {:?}",
                self.ready_timeout
            ))),
        }
    }
}

fn sibling_binary() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join(PROXY_BINARY_NAME);
    candidate.is_file().then_some(candidate)
}

/// An open session with the daemon
///
/// The daemon counts the session as active until this is dropped.
#[derive(Debug)]
pub struct ProxySession {
    _stream: UnixStream,
    addresses: AddressPair,
}

impl ProxySession {
    /// Addresses advertised by the daemon
    pub fn addresses(&self) -> &AddressPair {
        &self.addresses
    }
}

/// Dial the daemon, starting it once if nothing is serving
pub async fn connect(socket: &SocketGuard, launcher: &DaemonLauncher) -> Result<ProxySession, PhError> {
    let mut stream = match socket.dial().await {
        Ok(stream) => stream,
        Err(e) if e.is_not_running() => {
            tracing::debug!("No proxy running ({}), starting one", e);
            launcher.launch().await?;
            socket.dial().await?
        }
        Err(e) => return Err(e.into()),
    };

    let addresses = client_handshake(&mut stream).await?;
    Ok(ProxySession {
        _stream: stream,
        addresses,
    })
}
