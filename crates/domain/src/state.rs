//! Refresh state machine.

use serde::{Deserialize, Serialize};

/// State of the single refresh operation.
///
/// `Idle --refresh--> InFlight --resolved--> Idle`. At most one refresh
/// network call exists while `InFlight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    /// No refresh is running.
    #[default]
    Idle,
    /// A refresh call is outstanding; new callers subscribe to it.
    InFlight,
}

impl RefreshState {
    /// Returns true if a refresh call is outstanding.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::InFlight)
    }
}
