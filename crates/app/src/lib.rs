//! Shopkeep API client - component wiring
//!
//! Builds the credential store, refresh coordinator, expiration monitor and
//! request executor on top of the reqwest transport, sharing one coordinator
//! between the monitor and the executor.

use std::sync::Arc;

use shopkeep_application::{
    ApiClient, Clock, CredentialStore, ExpirationMonitor, KeyValueStorage, RefreshCoordinator,
    StorageError, TransportError,
};
use shopkeep_domain::ClientSettings;
use shopkeep_infrastructure::{LoggingSessionListener, ReqwestTransport, SystemClock};

/// Errors that prevent the client from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The HTTP client could not be built.
    #[error("failed to create HTTP transport: {0}")]
    Transport(#[from] TransportError),

    /// The persisted session could not be read.
    #[error("failed to restore session: {0}")]
    Storage(#[from] StorageError),
}

/// A fully wired client.
#[derive(Debug)]
pub struct Shopkeep {
    /// Request executor.
    pub client: ApiClient<ReqwestTransport>,
    /// Proactive refresh timer, not yet started.
    pub monitor: Arc<ExpirationMonitor<ReqwestTransport>>,
    /// Receives the session-ended signal.
    pub listener: Arc<LoggingSessionListener>,
}

/// Wires every component and restores any persisted session.
///
/// # Errors
///
/// Returns an error if the transport cannot be built or the storage cannot
/// be read.
pub async fn connect(
    settings: ClientSettings,
    storage: Arc<dyn KeyValueStorage>,
) -> Result<Shopkeep, StartupError> {
    let settings = Arc::new(settings);
    let transport = Arc::new(ReqwestTransport::new(&settings)?);

    let clock = Arc::new(SystemClock::new());

    let credentials = CredentialStore::new(storage);
    if credentials.restore().await? {
        let status = credentials
            .status(clock.now(), settings.refresh_threshold())
            .await;
        if status.is_usable() {
            tracing::info!(status = %status.display_message(), "restored previous session");
        } else {
            tracing::warn!(
                status = %status.display_message(),
                "restored session has expired, refreshing on first use"
            );
        }
    }

    let listener = Arc::new(LoggingSessionListener::new());
    let coordinator = Arc::new(RefreshCoordinator::new(
        Arc::clone(&transport),
        credentials.clone(),
        listener.clone(),
        Arc::clone(&settings),
    ));
    let monitor = Arc::new(ExpirationMonitor::new(
        Arc::clone(&coordinator),
        credentials.clone(),
        clock,
        &settings,
    ));
    let client = ApiClient::new(transport, credentials, coordinator, settings);

    Ok(Shopkeep {
        client,
        monitor,
        listener,
    })
}
