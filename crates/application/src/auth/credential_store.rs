//! Process-wide credential slot with write-through persistence.
//!
//! The in-memory slot is authoritative for reads, so a token written by one
//! caller is visible to every other caller as soon as `set_token` returns.
//! The backing `KeyValueStorage` keeps the slot across restarts.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use shopkeep_domain::{AccessToken, TokenStatus, decode_expiry};
use tokio::sync::RwLock;

use crate::ports::{KeyValueStorage, StorageError};

/// Storage key holding the access token.
pub const TOKEN_KEY: &str = "token";

/// Storage key holding the role tag.
pub const ROLE_KEY: &str = "role";

#[derive(Debug, Clone, Default)]
struct CredentialSlot {
    token: Option<AccessToken>,
    role: Option<String>,
}

/// Owner of the current access token and role tag.
///
/// Cloning is cheap and every clone shares the same slot.
#[derive(Clone)]
pub struct CredentialStore {
    slot: Arc<RwLock<CredentialSlot>>,
    storage: Arc<dyn KeyValueStorage>,
}

impl CredentialStore {
    /// Creates an empty store backed by `storage`.
    ///
    /// Call [`restore`](Self::restore) to load a previously persisted session.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(CredentialSlot::default())),
            storage,
        }
    }

    /// Loads the persisted token and role into the slot.
    ///
    /// Returns whether a token was found.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    pub async fn restore(&self) -> Result<bool, StorageError> {
        let mut slot = self.slot.write().await;
        let token = self.storage.get(TOKEN_KEY).await?;
        let role = self.storage.get(ROLE_KEY).await?;

        slot.token = token.filter(|raw| !raw.is_empty()).map(AccessToken::from);
        slot.role = role;

        if let Some(token) = &slot.token {
            tracing::debug!(token = %token.preview(), "restored persisted credential");
        }
        Ok(slot.token.is_some())
    }

    /// Returns the current token.
    pub async fn get_token(&self) -> Option<AccessToken> {
        self.slot.read().await.token.clone()
    }

    /// Returns the current role tag.
    pub async fn role(&self) -> Option<String> {
        self.slot.read().await.role.clone()
    }

    /// Stores a new token, and the role when one is given.
    ///
    /// The slot is updated before persistence, so readers observe the new
    /// token even if the write to storage fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    pub async fn set_token(
        &self,
        token: AccessToken,
        role: Option<String>,
    ) -> Result<(), StorageError> {
        let mut slot = self.slot.write().await;
        slot.token = Some(token.clone());
        if role.is_some() {
            slot.role.clone_from(&role);
        }

        self.storage.set(TOKEN_KEY, token.as_str()).await?;
        if let Some(role) = role {
            self.storage.set(ROLE_KEY, &role).await?;
        }
        Ok(())
    }

    /// Removes token and role together.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written. The
    /// in-memory slot is cleared regardless.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let mut slot = self.slot.write().await;
        slot.token = None;
        slot.role = None;

        self.storage.remove(TOKEN_KEY).await?;
        self.storage.remove(ROLE_KEY).await
    }

    /// Returns the token's `exp` claim in milliseconds, or `None` when it
    /// cannot be decoded.
    #[must_use]
    pub fn decode_expiry(token: &AccessToken) -> Option<i64> {
        decode_expiry(token.as_str())
    }

    /// Classifies the current token at `now` against `threshold`.
    pub async fn status(&self, now: DateTime<Utc>, threshold: TimeDelta) -> TokenStatus {
        let slot = self.slot.read().await;
        TokenStatus::assess(slot.token.as_ref(), now, threshold)
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}
