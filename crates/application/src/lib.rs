//! Shopkeep Application - Credential lifecycle and request execution
//!
//! This crate defines the application layer with:
//! - Port traits (interfaces for transport, storage, time and navigation)
//! - The credential store, refresh coordinator and expiration monitor
//! - The request executor that attaches credentials and retries once on 401

pub mod api_client;
pub mod auth;
pub mod error;
pub mod ports;

#[cfg(test)]
pub(crate) mod test_support;

pub use api_client::ApiClient;
pub use auth::{CredentialStore, ExpirationMonitor, MonitorAction, RefreshCoordinator};
pub use error::{ApiError, ApiResult, RefreshError};
pub use ports::{
    Clock, HttpTransport, KeyValueStorage, OutboundRequest, SessionListener, StorageError,
    TransportError,
};
