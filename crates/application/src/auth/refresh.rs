//! Single-flight credential refresh.
//!
//! The coordinator owns the refresh state machine
//! (`Idle --refresh--> InFlight --resolved--> Idle`). The first caller to
//! find it idle starts the one network call on its own task; everyone
//! arriving while it is in flight is queued and resolved in FIFO order with
//! the same outcome. Dropping any caller, the first one included, leaves the
//! call running.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shopkeep_domain::{
    AccessToken, AuthGrant, ClientSettings, HttpMethod, PendingRequest, RefreshState,
};
use tokio::sync::oneshot;

use crate::auth::CredentialStore;
use crate::error::RefreshError;
use crate::ports::{HttpTransport, OutboundRequest, SessionListener};

type RefreshOutcome = Result<AccessToken, RefreshError>;
type Waiter = oneshot::Sender<RefreshOutcome>;

#[derive(Default)]
struct RefreshSlot {
    state: RefreshState,
    waiters: Vec<Waiter>,
}

/// Guarantees at most one refresh network call at a time.
pub struct RefreshCoordinator<T> {
    transport: Arc<T>,
    credentials: CredentialStore,
    listener: Arc<dyn SessionListener>,
    settings: Arc<ClientSettings>,
    slot: Mutex<RefreshSlot>,
    network_calls: AtomicU64,
}

impl<T> RefreshCoordinator<T> {
    /// Current state of the refresh state machine.
    #[must_use]
    pub fn state(&self) -> RefreshState {
        self.lock_slot().state
    }

    /// Number of callers queued behind the caller that started the
    /// in-flight refresh.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.lock_slot().waiters.len()
    }

    /// Number of refresh network calls issued so far.
    #[must_use]
    pub fn network_calls(&self) -> u64 {
        self.network_calls.load(Ordering::Relaxed)
    }

    // Never held across an await point.
    fn lock_slot(&self) -> MutexGuard<'_, RefreshSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transitions to `Idle` and hands back the queued waiters.
    fn settle(&self) -> Vec<Waiter> {
        let mut slot = self.lock_slot();
        slot.state = RefreshState::Idle;
        mem::take(&mut slot.waiters)
    }
}

impl<T: HttpTransport + 'static> RefreshCoordinator<T> {
    /// Creates an idle coordinator.
    pub fn new(
        transport: Arc<T>,
        credentials: CredentialStore,
        listener: Arc<dyn SessionListener>,
        settings: Arc<ClientSettings>,
    ) -> Self {
        Self {
            transport,
            credentials,
            listener,
            settings,
            slot: Mutex::new(RefreshSlot::default()),
            network_calls: AtomicU64::new(0),
        }
    }

    /// Obtains a new access token.
    ///
    /// If a refresh is already in flight this waits for its outcome instead
    /// of starting another one. On failure the credential slot is cleared and
    /// the session listener is told the session ended, once per failed
    /// refresh, no matter how many callers were waiting.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the refresh failure shared by every caller of this cycle.
    pub async fn refresh(self: &Arc<Self>) -> Result<AccessToken, RefreshError> {
        let (tx, rx) = oneshot::channel();
        let started = {
            let mut slot = self.lock_slot();
            match slot.state {
                RefreshState::InFlight => {
                    slot.waiters.push(tx);
                    None
                }
                RefreshState::Idle => {
                    slot.state = RefreshState::InFlight;
                    Some(tx)
                }
            }
        };

        match started {
            Some(first) => {
                let cycle = Cycle {
                    coordinator: Arc::clone(self),
                    settled: false,
                };
                tokio::spawn(cycle.run(first));
            }
            None => tracing::debug!("refresh already in flight, waiting for its outcome"),
        }

        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    async fn request_grant(&self) -> Result<AuthGrant, RefreshError> {
        let timeout = self.settings.refresh_timeout();
        let url = PendingRequest::new(HttpMethod::Post, self.settings.refresh_path.as_str())
            .resolve_url(&self.settings.base_url)
            .map_err(|e| RefreshError::InvalidEndpoint(e.to_string()))?;
        // No bearer header: the session cookie is what the backend trusts here.
        let request = OutboundRequest::new(HttpMethod::Post, url, timeout);

        self.network_calls.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(url = %request.url, "requesting new access token");

        let sent = tokio::time::timeout(timeout, self.transport.execute(&request)).await;
        let response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => return Err(RefreshError::Transport(error.to_string())),
            Err(_) => {
                return Err(RefreshError::TimedOut {
                    timeout_ms: request.timeout_ms(),
                });
            }
        };

        if !response.is_success() {
            return Err(RefreshError::Rejected {
                status: response.status,
                message: response
                    .error_message()
                    .unwrap_or_else(|| format!("API error: {}", response.status)),
            });
        }

        response
            .json::<AuthGrant>()
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))
    }

    async fn succeed(&self, grant: AuthGrant) -> RefreshOutcome {
        let role = grant.resolved_role();
        let token = grant.token;

        if let Err(error) = self.credentials.set_token(token.clone(), role).await {
            // Readers already see the new token; only persistence is lost.
            tracing::warn!(%error, "failed to persist refreshed credential");
        }
        Ok(token)
    }

    async fn fail(&self, error: RefreshError) -> RefreshOutcome {
        if let Err(storage_error) = self.credentials.clear().await {
            tracing::warn!(error = %storage_error, "failed to clear persisted credential");
        }
        Err(error)
    }
}

impl<T> fmt::Debug for RefreshCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("state", &self.state())
            .field("network_calls", &self.network_calls())
            .finish_non_exhaustive()
    }
}

/// One refresh cycle, owned by the task performing the network call.
///
/// If the task dies before the refresh resolves, the coordinator returns to
/// `Idle` and the queued callers observe `Abandoned`.
struct Cycle<T> {
    coordinator: Arc<RefreshCoordinator<T>>,
    settled: bool,
}

impl<T: HttpTransport + 'static> Cycle<T> {
    async fn run(mut self, first: Waiter) {
        let coordinator = Arc::clone(&self.coordinator);
        let outcome = match coordinator.request_grant().await {
            Ok(grant) => coordinator.succeed(grant).await,
            Err(error) => coordinator.fail(error).await,
        };

        self.settled = true;
        let waiters = coordinator.settle();
        match &outcome {
            Ok(token) => tracing::info!(
                token = %token.preview(),
                waiters = waiters.len(),
                "access token refreshed"
            ),
            Err(error) => {
                tracing::warn!(%error, waiters = waiters.len(), "credential refresh failed");
            }
        }

        if outcome.is_err() {
            if coordinator.listener.is_on_login_surface() {
                tracing::debug!("already on the login surface, not signalling session end");
            } else {
                coordinator.listener.session_ended();
            }
        }

        // A dropped receiver means that caller went away; nothing to deliver.
        for waiter in std::iter::once(first).chain(waiters) {
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl<T> Drop for Cycle<T> {
    fn drop(&mut self) {
        if !self.settled {
            let abandoned = self.coordinator.settle();
            tracing::warn!(
                waiters = abandoned.len(),
                "refresh task ended before completion"
            );
        }
    }
}
