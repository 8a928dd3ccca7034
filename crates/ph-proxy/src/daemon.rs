//! Daemon startup and serving
//!
//! Startup binds the two reverse-proxy listeners first and the Unix socket
//! last. Losing the socket race to a live daemon is not an error: this
//! process is a redundant spawn and simply reports ready. A socket file
//! nobody answers on is left over from a crash and is replaced once.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, UnixListener};

use ph_core::config::ProxyConfig;
use ph_core::{BuildIdentity, SocketError, SocketGuard};

use crate::ipc::IpcServer;
use crate::server::{bind_loopback, ReverseProxy, UpstreamScheme};
use crate::state::{DaemonPhase, ProxyEndpoints, ProxyState};

/// Start of the ready line that follows `OK` on a fresh start
pub const LISTENING_PREFIX: &str = "Listening on unix";

/// Result of trying to become the daemon
pub enum StartOutcome {
    /// This process owns the socket and is ready to run
    Started(Daemon),
    /// A live daemon already answers on the socket
    AlreadyRunning,
}

/// A daemon with all listeners bound, not yet serving
pub struct Daemon {
    state: Arc<ProxyState>,
    socket: SocketGuard,
    ipc: UnixListener,
    plain: TcpListener,
    tls: TcpListener,
}

impl Daemon {
    /// Bind the proxy listeners and claim the socket
    pub async fn start(
        config: ProxyConfig,
        socket: SocketGuard,
        identity: BuildIdentity,
    ) -> Result<StartOutcome> {
        let plain = bind_loopback()
            .await
            .context("Failed to bind plain proxy listener")?;
        let tls = bind_loopback()
            .await
            .context("Failed to bind TLS proxy listener")?;
        let endpoints = ProxyEndpoints {
            plain: plain.local_addr()?,
            tls: tls.local_addr()?,
        };

        let state = Arc::new(ProxyState::new(config, identity, endpoints));

        let Some(ipc) = claim_socket(&socket)
            .await
            .with_context(|| format!("Failed to listen on {:?}", socket.path()))?
        else {
            return Ok(StartOutcome::AlreadyRunning);
        };
        state.set_phase(DaemonPhase::Listening);

        Ok(StartOutcome::Started(Daemon {
            state,
            socket,
            ipc,
            plain,
            tls,
        }))
    }

    /// Shared state of this run
    pub fn state(&self) -> &Arc<ProxyState> {
        &self.state
    }

    /// Path of the bound socket
    pub fn socket_path(&self) -> PathBuf {
        self.socket.path()
    }

    /// Second ready line, telling the spawner where everything listens
    pub fn listening_line(&self) -> String {
        format!(
            "{} socket={} http={} https={}",
            LISTENING_PREFIX,
            self.socket_path().display(),
            self.state.endpoints.plain,
            self.state.endpoints.tls
        )
    }

    /// Serve until the first of the accept loop and the two proxies stops
    ///
    /// After shutdown the accept loop returns `Ok`; the proxies only stop
    /// on error, and are dropped with the process.
    pub async fn run(self) -> Result<()> {
        let state = Arc::clone(&self.state);
        let plain = ReverseProxy::new(UpstreamScheme::Preserve)
            .context("Failed to build plain proxy client")?;
        let tls = ReverseProxy::new(UpstreamScheme::ForceHttps)
            .context("Failed to build TLS proxy client")?;
        let ipc = IpcServer::new(self.ipc, Arc::clone(&state));

        state.set_phase(DaemonPhase::Serving);
        tracing::info!(
            "Serving on {:?} (https proxy {}, http proxy {})",
            self.socket.path(),
            state.endpoints.tls,
            state.endpoints.plain
        );

        let result = tokio::select! {
            result = ipc.run() => result,
            result = plain.serve(self.plain) => match result {
                Ok(()) => Err(anyhow::anyhow!("Plain proxy stopped unexpectedly")),
                Err(e) => Err(e).context("Plain proxy failed"),
            },
            result = tls.serve(self.tls) => match result {
                Ok(()) => Err(anyhow::anyhow!("TLS proxy stopped unexpectedly")),
                Err(e) => Err(e).context("TLS proxy failed"),
            },
        };

        state.set_phase(DaemonPhase::Stopped);
        result
    }
}

/// Listen on the socket, detecting a live daemon or a stale socket file
///
/// Returns `None` when another daemon answers.
async fn claim_socket(socket: &SocketGuard) -> Result<Option<UnixListener>, SocketError> {
    match socket.listen() {
        Ok(listener) => return Ok(Some(listener)),
        Err(SocketError::AddrInUse(_)) => {}
        Err(e) => return Err(e),
    }

    match socket.dial().await {
        Ok(_probe) => {
            tracing::info!("Another proxy is already serving on {:?}", socket.path());
            return Ok(None);
        }
        Err(e) if e.is_not_running() => {
            tracing::warn!("Removing stale socket {:?}", socket.path());
            socket.remove_stale()?;
        }
        Err(e) => return Err(e),
    }

    socket.listen().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::DirBuilderExt;
    use tempfile::TempDir;

    fn private_socket(root: &TempDir) -> SocketGuard {
        let dir = root.path().join("sock");
        std::fs::DirBuilder::new().mode(0o700).create(&dir).unwrap();
        SocketGuard::new(dir)
    }

    #[tokio::test]
    async fn test_claim_fresh_socket() {
        let root = TempDir::new().unwrap();
        let socket = private_socket(&root);
        assert!(claim_socket(&socket).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_claim_detects_live_daemon() {
        let root = TempDir::new().unwrap();
        let socket = private_socket(&root);
        let _live = socket.listen().unwrap();
        assert!(claim_socket(&socket).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_replaces_stale_socket() {
        let root = TempDir::new().unwrap();
        let socket = private_socket(&root);
        drop(socket.listen().unwrap());
        assert!(socket.path().exists());

        let listener = claim_socket(&socket).await.unwrap();
        assert!(listener.is_some());
        socket.dial().await.unwrap();
    }

    #[tokio::test]
    async fn test_listening_line_names_socket_and_addresses() {
        let root = TempDir::new().unwrap();
        let socket = private_socket(&root);
        let daemon = match Daemon::start(
            ProxyConfig::default(),
            socket.clone(),
            BuildIdentity::new("test-build"),
        )
        .await
        .unwrap()
        {
            StartOutcome::Started(daemon) => daemon,
            StartOutcome::AlreadyRunning => panic!("socket should be free"),
        };

        let endpoints = daemon.state().endpoints;
        assert_eq!(
            daemon.listening_line(),
            format!(
                "Listening on unix socket={} http={} https={}",
                socket.path().display(),
                endpoints.plain,
                endpoints.tls
            )
        );
    }

    #[tokio::test]
    async fn test_claim_refuses_insecure_dir() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let socket = private_socket(&root);
        std::fs::set_permissions(socket.dir(), std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(
            claim_socket(&socket).await.unwrap_err(),
            SocketError::InsecureDirectory { .. }
        ));
    }
}
