//! Shared daemon state

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use ph_core::config::ProxyConfig;
use ph_core::BuildIdentity;
use ph_protocol::AddressPair;
use tokio_util::sync::CancellationToken;

use crate::session::IdleTracker;

/// Loopback addresses of the two reverse proxies, fixed for the daemon's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyEndpoints {
    /// Forwards requests unchanged
    pub plain: SocketAddr,
    /// Forces the upstream scheme to https
    pub tls: SocketAddr,
}

impl ProxyEndpoints {
    /// Addresses as advertised in the handshake
    pub fn address_pair(&self) -> AddressPair {
        AddressPair::new(self.tls.to_string(), self.plain.to_string())
    }
}

/// Lifecycle of a daemon run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DaemonPhase {
    /// Proxy listeners bound, socket not yet
    Starting,
    /// Socket bound
    Listening,
    /// Accepting sessions and proxying
    Serving,
    /// Shutdown requested, accept loop unwinding
    Draining,
    /// Run finished
    Stopped,
}

/// Why the daemon is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// No session for longer than the idle limit
    Idle,
    /// The binary on disk reports a different build
    Updated,
    /// Termination signal received
    Signal(&'static str),
    /// The socket listener failed
    AcceptFailed,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownCause::Idle => write!(f, "idle timeout"),
            ShutdownCause::Updated => write!(f, "binary updated"),
            ShutdownCause::Signal(name) => write!(f, "received {}", name),
            ShutdownCause::AcceptFailed => write!(f, "accept failed"),
        }
    }
}

/// State owned by one daemon run and shared by all of its tasks
pub struct ProxyState {
    /// Configuration
    pub config: ProxyConfig,
    /// Build this daemon was compiled from
    pub identity: BuildIdentity,
    /// Reverse proxy addresses
    pub endpoints: ProxyEndpoints,
    /// Session accounting
    pub sessions: Arc<IdleTracker>,
    shutdown: CancellationToken,
    phase: Mutex<DaemonPhase>,
}

impl ProxyState {
    /// Create state for a daemon whose proxy listeners are bound
    pub fn new(config: ProxyConfig, identity: BuildIdentity, endpoints: ProxyEndpoints) -> Self {
        Self {
            config,
            identity,
            endpoints,
            sessions: Arc::new(IdleTracker::new()),
            shutdown: CancellationToken::new(),
            phase: Mutex::new(DaemonPhase::Starting),
        }
    }

    /// Token cancelled when shutdown begins
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Close the socket listener. Repeated calls are no-ops.
    pub fn shutdown(&self, cause: ShutdownCause) {
        if self.shutdown.is_cancelled() {
            tracing::debug!("Shutdown already in progress, ignoring {}", cause);
            return;
        }
        tracing::info!("Shutting down: {}", cause);
        self.set_phase(DaemonPhase::Draining);
        self.shutdown.cancel();
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> DaemonPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the lifecycle phase; never moves backwards
    pub fn set_phase(&self, next: DaemonPhase) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if next > *phase {
            tracing::debug!("Daemon phase {:?} -> {:?}", *phase, next);
            *phase = next;
        }
    }
}

#[cfg(test)]
pub(crate) fn test_state(config: ProxyConfig) -> Arc<ProxyState> {
    let endpoints = ProxyEndpoints {
        plain: "127.0.0.1:9002".parse().unwrap(),
        tls: "127.0.0.1:9001".parse().unwrap(),
    };
    Arc::new(ProxyState::new(
        config,
        BuildIdentity::new("test-build"),
        endpoints,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_pair_order() {
        let state = test_state(ProxyConfig::default());
        let pair = state.endpoints.address_pair();
        assert_eq!(pair.encode(), "127.0.0.1:9001\n127.0.0.1:9002");
    }

    #[test]
    fn test_shutdown_twice_is_noop() {
        let state = test_state(ProxyConfig::default());
        state.set_phase(DaemonPhase::Serving);
        state.shutdown(ShutdownCause::Idle);
        state.shutdown(ShutdownCause::Updated);
        assert!(state.shutdown_token().is_cancelled());
        assert_eq!(state.phase(), DaemonPhase::Draining);
    }

    #[test]
    fn test_phase_never_moves_backwards() {
        let state = test_state(ProxyConfig::default());
        assert_eq!(state.phase(), DaemonPhase::Starting);
        state.set_phase(DaemonPhase::Stopped);
        state.set_phase(DaemonPhase::Serving);
        assert_eq!(state.phase(), DaemonPhase::Stopped);
    }
}
