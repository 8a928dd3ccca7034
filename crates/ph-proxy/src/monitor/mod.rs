//! Background shutdown triggers
//!
//! Each monitor watches for one reason to stop and, when it fires, closes
//! the socket listener through [`ProxyState::shutdown`]. They all exit
//! once shutdown has begun.

pub mod idle;
pub mod signal;
pub mod update;

pub use idle::IdleMonitor;
pub use signal::SignalMonitor;
pub use update::UpdateMonitor;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::state::ProxyState;

/// Install signal handlers and start all three monitors
pub fn spawn_all(state: &Arc<ProxyState>, binary: PathBuf) -> std::io::Result<Vec<JoinHandle<()>>> {
    let signals = SignalMonitor::install()?;

    let idle = IdleMonitor::new(state.config.max_idle_duration);
    let update = UpdateMonitor::new(binary, state.config.poll_update_interval);

    tracing::info!(
        "Monitors started (max_idle={:?}, poll_update={:?})",
        state.config.max_idle_duration,
        state.config.poll_update_interval
    );

    Ok(vec![
        signals.spawn(Arc::clone(state)),
        idle.spawn(Arc::clone(state)),
        update.spawn(Arc::clone(state)),
    ])
}
