//! Credential lifecycle for the Shopkeep API client.
//!
//! This module provides:
//! - The credential store: one process-wide token/role slot with write-through persistence
//! - The refresh coordinator: at most one refresh call in flight, FIFO waiters
//! - The expiration monitor: periodic proactive refresh ahead of expiry

mod credential_store;
mod monitor;
mod refresh;

pub use credential_store::{CredentialStore, ROLE_KEY, TOKEN_KEY};
pub use monitor::{ExpirationMonitor, MonitorAction};
pub use refresh::RefreshCoordinator;
