//! Session-ended adapter for headless use.

use std::sync::atomic::{AtomicU64, Ordering};

use shopkeep_application::ports::SessionListener;

/// Logs the end of a session instead of navigating anywhere.
///
/// Front ends with a login screen provide their own `SessionListener`; this
/// one suits command-line and background use.
#[derive(Debug, Default)]
pub struct LoggingSessionListener {
    ended: AtomicU64,
}

impl LoggingSessionListener {
    /// Creates a listener.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ended: AtomicU64::new(0),
        }
    }

    /// How many times the session has ended.
    #[must_use]
    pub fn sessions_ended(&self) -> u64 {
        self.ended.load(Ordering::Relaxed)
    }
}

impl SessionListener for LoggingSessionListener {
    fn session_ended(&self) {
        self.ended.fetch_add(1, Ordering::Relaxed);
        tracing::warn!("session ended, sign in again to continue");
    }
}
