//! Token status classification.

use chrono::{DateTime, TimeDelta, Utc};

use super::AccessToken;

/// Status of the current credential relative to a refresh threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    /// No token is stored.
    NotAuthenticated,
    /// A token is stored but its expiry cannot be decoded.
    UnknownExpiry,
    /// Token is valid and not expiring soon.
    Valid {
        /// Seconds until expiry.
        seconds_remaining: i64,
    },
    /// Token is valid but inside the refresh threshold.
    Expiring {
        /// Seconds until expiry.
        seconds_remaining: i64,
    },
    /// Token has expired.
    Expired,
}

impl TokenStatus {
    /// Classifies `token` at instant `now` against `threshold`.
    ///
    /// A token is `Expiring` when `0 < remaining < threshold` and `Expired`
    /// when `remaining <= 0`.
    #[must_use]
    pub fn assess(token: Option<&AccessToken>, now: DateTime<Utc>, threshold: TimeDelta) -> Self {
        let Some(token) = token else {
            return Self::NotAuthenticated;
        };
        let Some(expiry_ms) = token.expiry_millis() else {
            return Self::UnknownExpiry;
        };

        let remaining_ms = expiry_ms.saturating_sub(now.timestamp_millis());
        if remaining_ms <= 0 {
            Self::Expired
        } else if remaining_ms < threshold.num_milliseconds() {
            Self::Expiring {
                seconds_remaining: remaining_ms / 1000,
            }
        } else {
            Self::Valid {
                seconds_remaining: remaining_ms / 1000,
            }
        }
    }

    /// Returns true if a token is present and not known to be expired.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(
            self,
            Self::Valid { .. } | Self::Expiring { .. } | Self::UnknownExpiry
        )
    }

    /// Returns true if the token should be refreshed ahead of time or is expired.
    #[must_use]
    pub const fn needs_refresh(&self) -> bool {
        matches!(self, Self::Expiring { .. } | Self::Expired)
    }

    /// Get a user-friendly display message.
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "Not authenticated".to_string(),
            Self::UnknownExpiry => "Authenticated (expiry unknown)".to_string(),
            Self::Valid { seconds_remaining } => {
                let secs = *seconds_remaining;
                if secs > 3600 {
                    format!("Valid for {} hours", secs / 3600)
                } else if secs > 60 {
                    format!("Valid for {} minutes", secs / 60)
                } else {
                    format!("Valid for {secs} seconds")
                }
            }
            Self::Expiring { seconds_remaining } => {
                format!("Expiring in {seconds_remaining} seconds (will auto-refresh)")
            }
            Self::Expired => "Expired".to_string(),
        }
    }
}
