//! HTTP transport port

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use shopkeep_domain::{HttpMethod, RequestBody, ResponseSpec};
use thiserror::Error;
use url::Url;

/// Errors produced before a response was received.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete within its timeout.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The body could not be encoded for the wire.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

/// A fully resolved request, ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Absolute URL including query string
    pub url: Url,
    /// Headers, including `Authorization` and `Content-Type` when set
    pub headers: BTreeMap<String, String>,
    /// Body
    pub body: RequestBody,
    /// Per-request timeout
    pub timeout: Duration,
}

impl OutboundRequest {
    /// Creates a request with no headers and an empty body.
    #[must_use]
    pub const fn new(method: HttpMethod, url: Url, timeout: Duration) -> Self {
        Self {
            method,
            url,
            headers: BTreeMap::new(),
            body: RequestBody::Empty,
            timeout,
        }
    }

    /// Returns a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the bearer token attached to this request, if any.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")
            .and_then(|value| value.strip_prefix("Bearer "))
    }

    /// Timeout in whole milliseconds, saturating.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Port for sending HTTP requests.
///
/// Implementations must carry cookies across calls so the refresh endpoint
/// can re-authenticate from the session cookie set at login.
pub trait HttpTransport: Send + Sync {
    /// Sends the request and returns whatever response arrived, including
    /// non-2xx statuses.
    ///
    /// # Errors
    ///
    /// Returns an error only if no response was received.
    fn execute(
        &self,
        request: &OutboundRequest,
    ) -> impl Future<Output = Result<ResponseSpec, TransportError>> + Send;
}
