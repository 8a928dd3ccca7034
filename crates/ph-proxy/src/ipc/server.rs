//! IPC server implementation
//!
//! Accepts on the proxy's Unix socket until the shutdown token fires.
//! Only peers running as the same user are served.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{UnixListener, UnixStream};

use ph_core::socket::current_euid;
use ph_core::PhError;
use ph_protocol::{serve_handshake, wait_for_eof, HandshakeError};

use crate::state::{ProxyState, ShutdownCause};

/// Handshake server on the proxy socket
pub struct IpcServer {
    listener: UnixListener,
    state: Arc<ProxyState>,
}

impl IpcServer {
    /// Create a new IPC server on a bound listener
    pub fn new(listener: UnixListener, state: Arc<ProxyState>) -> Self {
        Self { listener, state }
    }

    /// Accept sessions until shutdown
    ///
    /// The listener is dropped on return, so later dials are refused.
    pub async fn run(self) -> Result<()> {
        let cancel = self.state.shutdown_token();
        let euid = current_euid();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("IPC listener closed");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            if !peer_is_same_user(&stream, euid) {
                                continue;
                            }

                            let state = Arc::clone(&self.state);
                            tokio::spawn(async move {
                                match handle_session(stream, state).await {
                                    Ok(()) => tracing::debug!("Session finished"),
                                    // Probe dials from a redundant daemon close straight away
                                    Err(PhError::Handshake(HandshakeError::Closed)) => {
                                        tracing::debug!("Client closed before handshake completed");
                                    }
                                    Err(e) => tracing::warn!("Session failed: {}", e),
                                }
                            });
                        }
                        Err(e) => {
                            self.state.shutdown(ShutdownCause::AcceptFailed);
                            return Err(e).context("Failed to accept IPC connection");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

fn peer_is_same_user(stream: &UnixStream, euid: u32) -> bool {
    match stream.peer_cred() {
        Ok(cred) if cred.uid() == euid => true,
        Ok(cred) => {
            tracing::warn!("Rejected IPC connection from uid {}", cred.uid());
            false
        }
        Err(e) => {
            tracing::warn!("Rejected IPC connection without peer credentials: {}", e);
            false
        }
    }
}

/// Serve one session: two address rounds, then hold until the client leaves
async fn handle_session(mut stream: UnixStream, state: Arc<ProxyState>) -> Result<(), PhError> {
    let _session = state.sessions.begin();

    serve_handshake(&mut stream, &state.endpoints.address_pair()).await?;
    wait_for_eof(&mut stream, state.config.session_hold_timeout).await?;
    Ok(())
}
