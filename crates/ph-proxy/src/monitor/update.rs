//! Binary replacement detection

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ph_core::BuildIdentity;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::state::{ProxyState, ShutdownCause};

/// Shuts the daemon down once the binary on disk reports a different build
pub struct UpdateMonitor {
    /// Binary to query with `--print-label`
    pub binary: PathBuf,
    /// Poll interval
    pub interval: Duration,
}

impl UpdateMonitor {
    /// Create a new update monitor
    pub fn new(binary: PathBuf, interval: Duration) -> Self {
        Self { binary, interval }
    }

    /// Run on a new task
    pub fn spawn(self, state: Arc<ProxyState>) -> JoinHandle<()> {
        tokio::spawn(self.run(state))
    }

    /// Poll until the on-disk label differs from ours
    pub async fn run(self, state: Arc<ProxyState>) {
        let cancel = state.shutdown_token();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let queried = tokio::select! {
                _ = cancel.cancelled() => return,
                queried = BuildIdentity::query(&self.binary) => queried,
            };

            match queried {
                Ok(on_disk) if on_disk != state.identity => {
                    tracing::info!(
                        "Binary {:?} is now build {}, running build {}",
                        self.binary,
                        on_disk,
                        state.identity
                    );
                    state.shutdown(ShutdownCause::Updated);
                    return;
                }
                Ok(_) => tracing::trace!("Binary {:?} unchanged", self.binary),
                Err(e) => {
                    tracing::warn!("Failed to query build label of {:?}: {}", self.binary, e);
                }
            }
        }
    }
}
