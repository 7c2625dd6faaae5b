//! Client settings domain model
//!
//! Defines where the API lives and how the credential lifecycle is tuned.

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Settings for the authenticated API client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Base URL every request path is appended to.
    pub base_url: String,
    /// Login endpoint path.
    pub login_path: String,
    /// Refresh endpoint path.
    pub refresh_path: String,
    /// Logout endpoint path.
    pub logout_path: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Timeout for the refresh call in milliseconds.
    pub refresh_timeout_ms: u64,
    /// Interval between expiration checks in seconds.
    pub monitor_interval_secs: u64,
    /// Remaining lifetime below which a token is refreshed proactively.
    pub refresh_threshold_secs: u64,
    /// Whether POST/PATCH requests are resent after a refresh.
    pub retry_non_idempotent: bool,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            login_path: "/auth/login".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            logout_path: "/auth/logout".to_string(),
            request_timeout_ms: 30_000,
            refresh_timeout_ms: 10_000,
            monitor_interval_secs: 60,
            refresh_threshold_secs: 300,
            retry_non_idempotent: true,
            user_agent: concat!("Shopkeep/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientSettings {
    /// Creates default settings pointing at `base_url`.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Refresh call timeout.
    #[must_use]
    pub const fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Expiration monitor period.
    #[must_use]
    pub const fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    /// Proactive refresh threshold.
    #[must_use]
    pub fn refresh_threshold(&self) -> TimeDelta {
        TimeDelta::try_seconds(i64::try_from(self.refresh_threshold_secs).unwrap_or(i64::MAX))
            .unwrap_or(TimeDelta::MAX)
    }
}
