//! Session accounting for idle shutdown

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
struct Activity {
    last_activity: Instant,
    active_sessions: usize,
}

/// Tracks open sessions and the time of the last session start or end
#[derive(Debug)]
pub struct IdleTracker {
    inner: Mutex<Activity>,
}

impl IdleTracker {
    /// Create a tracker; creation counts as activity
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Activity {
                last_activity: Instant::now(),
                active_sessions: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Activity> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a session start; the session ends when the guard is dropped
    pub fn begin(self: &Arc<Self>) -> SessionGuard {
        let mut activity = self.lock();
        activity.active_sessions += 1;
        activity.last_activity = Instant::now();
        SessionGuard {
            tracker: Arc::clone(self),
        }
    }

    fn end(&self) {
        let mut activity = self.lock();
        activity.active_sessions = activity.active_sessions.saturating_sub(1);
        activity.last_activity = Instant::now();
    }

    /// Number of sessions currently open
    pub fn active_sessions(&self) -> usize {
        self.lock().active_sessions
    }

    /// Time since the last activity, or `None` while any session is open
    pub fn idle_for(&self) -> Option<Duration> {
        let activity = self.lock();
        if activity.active_sessions > 0 {
            None
        } else {
            Some(activity.last_activity.elapsed())
        }
    }
}

impl Default for IdleTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Open session; dropping it records the session end
#[derive(Debug)]
pub struct SessionGuard {
    tracker: Arc<IdleTracker>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.tracker.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_guard_accounting() {
        let tracker = Arc::new(IdleTracker::new());
        assert_eq!(tracker.active_sessions(), 0);

        let first = tracker.begin();
        let second = tracker.begin();
        assert_eq!(tracker.active_sessions(), 2);
        assert_eq!(tracker.idle_for(), None);

        drop(first);
        assert_eq!(tracker.idle_for(), None);
        drop(second);
        assert_eq!(tracker.active_sessions(), 0);
        assert_eq!(tracker.idle_for(), Some(Duration::ZERO));

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(tracker.idle_for(), Some(Duration::from_secs(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_end_resets_idle_clock() {
        let tracker = Arc::new(IdleTracker::new());
        let guard = tracker.begin();
        tokio::time::advance(Duration::from_secs(60)).await;
        drop(guard);
        assert_eq!(tracker.idle_for(), Some(Duration::ZERO));
    }
}
