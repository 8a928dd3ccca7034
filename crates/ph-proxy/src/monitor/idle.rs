//! Idle shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::state::{ProxyState, ShutdownCause};

/// Slack added when re-arming so the next check lands strictly past the limit
const RECHECK_SLACK: Duration = Duration::from_millis(1);

/// Shuts the daemon down after a period with no sessions
pub struct IdleMonitor {
    /// Maximum idle time
    pub max_idle: Duration,
}

impl IdleMonitor {
    /// Create a new idle monitor
    pub fn new(max_idle: Duration) -> Self {
        Self { max_idle }
    }

    /// Run on a new task
    pub fn spawn(self, state: Arc<ProxyState>) -> JoinHandle<()> {
        tokio::spawn(self.run(state))
    }

    /// Wait until the daemon has been idle for strictly longer than `max_idle`
    pub async fn run(self, state: Arc<ProxyState>) {
        let cancel = state.shutdown_token();
        let mut wait = self.max_idle;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }

            wait = match state.sessions.idle_for() {
                Some(idle) if idle > self.max_idle => {
                    tracing::info!("No sessions for {:?}", idle);
                    state.shutdown(ShutdownCause::Idle);
                    return;
                }
                Some(idle) => self.max_idle - idle + RECHECK_SLACK,
                None => self.max_idle,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use ph_core::config::ProxyConfig;
    use tokio::time::{timeout, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_shuts_down_when_never_used() {
        let state = test_state(ProxyConfig::default());
        let start = Instant::now();

        IdleMonitor::new(Duration::from_secs(10))
            .run(Arc::clone(&state))
            .await;

        assert!(state.shutdown_token().is_cancelled());
        assert!(start.elapsed() > Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_session_suppresses_idle() {
        let state = test_state(ProxyConfig::default());
        let session = state.sessions.begin();
        IdleMonitor::new(Duration::from_secs(10)).spawn(Arc::clone(&state));

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert!(!state.shutdown_token().is_cancelled());

        drop(session);
        let ended = Instant::now();

        timeout(Duration::from_secs(30), state.shutdown_token().cancelled())
            .await
            .expect("idle monitor should fire after the session ends");
        assert!(ended.elapsed() > Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_activity_rearms() {
        let state = test_state(ProxyConfig::default());
        IdleMonitor::new(Duration::from_secs(10)).spawn(Arc::clone(&state));

        tokio::time::sleep(Duration::from_secs(6)).await;
        drop(state.sessions.begin());

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(!state.shutdown_token().is_cancelled());

        timeout(Duration::from_secs(5), state.shutdown_token().cancelled())
            .await
            .expect("idle monitor should fire once the re-armed wait elapses");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_on_external_shutdown() {
        let state = test_state(ProxyConfig::default());
        let handle = IdleMonitor::new(Duration::from_secs(3600)).spawn(Arc::clone(&state));

        state.shutdown(ShutdownCause::Updated);
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor should stop")
            .unwrap();
    }
}
