//! Signal-triggered shutdown
//!
//! SIGTERM asks for a graceful stop. SIGINT, SIGHUP and SIGQUIT close the
//! listener and exit straight away with status 1.

use std::sync::Arc;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;

use crate::state::{ProxyState, ShutdownCause};

/// Registered signal streams, waiting for the first delivery
pub struct SignalMonitor {
    terminate: Signal,
    interrupt: Signal,
    hangup: Signal,
    quit: Signal,
}

impl SignalMonitor {
    /// Register handlers; from here on these signals no longer kill the process directly
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            hangup: signal(SignalKind::hangup())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    /// Run on a new task
    pub fn spawn(self, state: Arc<ProxyState>) -> JoinHandle<()> {
        tokio::spawn(self.run(state))
    }

    /// Wait for exactly one signal
    pub async fn run(mut self, state: Arc<ProxyState>) {
        let cancel = state.shutdown_token();

        let fatal = tokio::select! {
            _ = cancel.cancelled() => return,
            _ = self.terminate.recv() => {
                state.shutdown(ShutdownCause::Signal("SIGTERM"));
                return;
            }
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.hangup.recv() => "SIGHUP",
            _ = self.quit.recv() => "SIGQUIT",
        };

        state.shutdown(ShutdownCause::Signal(fatal));
        tracing::error!("Received {}, exiting immediately", fatal);
        std::process::exit(1);
    }
}
