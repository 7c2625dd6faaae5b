//! Periodic expiration check with proactive refresh.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::TimeDelta;
use shopkeep_domain::{ClientSettings, TokenStatus};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::auth::{CredentialStore, RefreshCoordinator};
use crate::ports::{Clock, HttpTransport};

/// Shortest period the recurring check accepts.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// What a single expiration check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    /// No token is stored.
    NoToken,
    /// The token's expiry cannot be decoded; it is left to the reactive path.
    UnknownExpiry,
    /// The token is outside the refresh threshold.
    Fresh,
    /// A refresh was triggered and produced a new token.
    Refreshed,
    /// A refresh was triggered and failed.
    RefreshFailed,
}

/// Recurring timer that refreshes the credential ahead of expiry.
///
/// All refreshes go through the shared [`RefreshCoordinator`], so a
/// proactive refresh and a 401-triggered one never run at the same time.
pub struct ExpirationMonitor<T> {
    coordinator: Arc<RefreshCoordinator<T>>,
    credentials: CredentialStore,
    clock: Arc<dyn Clock>,
    interval: Duration,
    threshold: TimeDelta,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T> ExpirationMonitor<T> {
    /// Stops the recurring check. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        let Some(handle) = self.lock_task().take() else {
            return false;
        };
        handle.abort();
        tracing::debug!("expiration monitor stopped");
        true
    }

    /// Returns true while the recurring check is scheduled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_task()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: HttpTransport + 'static> ExpirationMonitor<T> {
    /// Creates a stopped monitor using the interval and threshold from `settings`.
    ///
    /// Intervals shorter than one second are raised to one second.
    pub fn new(
        coordinator: Arc<RefreshCoordinator<T>>,
        credentials: CredentialStore,
        clock: Arc<dyn Clock>,
        settings: &ClientSettings,
    ) -> Self {
        Self {
            coordinator,
            credentials,
            clock,
            interval: settings.monitor_interval().max(MIN_INTERVAL),
            threshold: settings.refresh_threshold(),
            task: Mutex::new(None),
        }
    }

    /// Starts the recurring check on the current tokio runtime.
    ///
    /// Returns false, without scheduling a second timer, if already running.
    /// The first check happens one interval after starting.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = self.lock_task();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let monitor = Arc::downgrade(self);
        let interval = self.interval;
        *task = Some(tokio::spawn(run(monitor, interval)));
        tracing::debug!(interval_secs = interval.as_secs(), "expiration monitor started");
        true
    }

    /// Runs one expiration check.
    pub async fn check(&self) -> MonitorAction {
        let Some(token) = self.credentials.get_token().await else {
            return MonitorAction::NoToken;
        };

        let status = TokenStatus::assess(Some(&token), self.clock.now(), self.threshold);
        if !status.needs_refresh() {
            return match status {
                TokenStatus::UnknownExpiry => MonitorAction::UnknownExpiry,
                _ => MonitorAction::Fresh,
            };
        }

        tracing::debug!(status = %status.display_message(), "refreshing ahead of expiry");
        match self.coordinator.refresh().await {
            Ok(_) => MonitorAction::Refreshed,
            Err(error) if status == TokenStatus::Expired => {
                // The coordinator has already cleared the slot and signalled
                // the session end.
                tracing::warn!(%error, "expired token could not be refreshed");
                MonitorAction::RefreshFailed
            }
            Err(error) => {
                // A later 401 still triggers the reactive path.
                tracing::debug!(%error, "proactive refresh failed");
                MonitorAction::RefreshFailed
            }
        }
    }
}

async fn run<T: HttpTransport + 'static>(monitor: Weak<ExpirationMonitor<T>>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(monitor) = monitor.upgrade() else {
            break;
        };
        let action = monitor.check().await;
        tracing::trace!(?action, "expiration check complete");
    }
}

impl<T> Drop for ExpirationMonitor<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_task().take() {
            handle.abort();
        }
    }
}

impl<T> fmt::Debug for ExpirationMonitor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpirationMonitor")
            .field("interval", &self.interval)
            .field("threshold", &self.threshold)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
