//! Application error types

use shopkeep_domain::{DomainError, HttpMethod, ResponseSpec};
use thiserror::Error;

use crate::ports::{StorageError, TransportError};

/// Why a credential refresh did not produce a new token.
///
/// Cloneable so one failure can be delivered to every waiting caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    /// The refresh endpoint answered with a non-2xx status.
    #[error("refresh rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided or generic message.
        message: String,
    },

    /// The refresh call never produced a response.
    #[error("refresh request failed: {0}")]
    Transport(String),

    /// The refresh call exceeded its timeout.
    #[error("refresh timed out after {timeout_ms}ms")]
    TimedOut {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The refresh response did not carry a token.
    #[error("invalid refresh response: {0}")]
    InvalidResponse(String),

    /// The refresh endpoint URL could not be built.
    #[error("invalid refresh endpoint: {0}")]
    InvalidEndpoint(String),

    /// The caller driving the refresh went away before it resolved.
    #[error("refresh abandoned before completion")]
    Abandoned,
}

/// Errors surfaced by the request executor.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] DomainError),

    /// The request body could not be serialized.
    #[error("failed to encode request body: {0}")]
    Encode(String),

    /// No response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a non-2xx status.
    #[error("{message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-provided message, or `API error: <status>`.
        message: String,
    },

    /// The credential could not be renewed; the session is over.
    #[error("session expired: {0}")]
    Refresh(#[from] RefreshError),

    /// The credential was renewed but the request is not replayed by policy.
    #[error("refusing to resend {method} {path} after credential refresh")]
    ReplayRefused {
        /// Method of the refused request.
        method: HttpMethod,
        /// Path of the refused request.
        path: String,
    },

    /// The 2xx body did not match the expected type.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The credential slot could not be written.
    #[error("credential storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// Builds a `Status` error from a non-2xx response.
    #[must_use]
    pub fn from_response(response: &ResponseSpec) -> Self {
        Self::Status {
            status: response.status,
            message: response
                .error_message()
                .unwrap_or_else(|| format!("API error: {}", response.status)),
        }
    }

    /// HTTP status, if the server answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the user has to sign in again.
    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::Refresh(_))
    }
}

/// Result type alias for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
