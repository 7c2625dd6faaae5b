//! Access token and embedded claims.
//!
//! Access tokens are opaque to the client except for their payload segment:
//! a three-part, dot-delimited structure whose middle part is base64url
//! encoded JSON carrying at least an `exp` claim (seconds since the epoch).
//! Nothing here ever fails loudly: a token that cannot be decoded simply has
//! no known expiry.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of segments in a well-formed token.
const TOKEN_SEGMENTS: usize = 3;

/// Short-lived bearer credential attached to authenticated requests.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw token string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the value for an `Authorization` header.
    #[must_use]
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Expiry in milliseconds since the epoch, if the token carries one.
    #[must_use]
    pub fn expiry_millis(&self) -> Option<i64> {
        decode_expiry(&self.0)
    }

    /// Expiry as a UTC timestamp, if the token carries one.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiry_millis().and_then(DateTime::from_timestamp_millis)
    }

    /// Decoded payload claims, or `None` if the payload is unreadable.
    #[must_use]
    pub fn claims(&self) -> Option<TokenClaims> {
        TokenClaims::decode(&self.0)
    }

    /// Returns a log-safe preview of the token (first 8 chars + ...).
    #[must_use]
    pub fn preview(&self) -> String {
        match self.0.get(..8) {
            Some(head) if self.0.len() > 12 => format!("{head}..."),
            _ => "***".to_string(),
        }
    }
}

// Debug must never print the full credential.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&self.preview()).finish()
    }
}

impl From<String> for AccessToken {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for AccessToken {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// The subset of payload claims the client cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenClaims {
    /// Expiry in milliseconds since the epoch.
    pub expires_at_ms: Option<i64>,
    /// Role tag embedded by the issuer.
    pub role: Option<String>,
}

impl TokenClaims {
    /// Decodes the payload segment of a raw token.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(raw: &str) -> Option<Self> {
        let payload = payload_object(raw)?;
        let expires_at_ms = payload
            .get("exp")
            .and_then(Value::as_f64)
            .filter(|exp| exp.is_finite())
            .map(|exp| (exp * 1000.0) as i64);
        let role = payload
            .get("role")
            .and_then(Value::as_str)
            .map(String::from);

        Some(Self {
            expires_at_ms,
            role,
        })
    }
}

/// Decodes the `exp` claim of a raw token, scaled to milliseconds.
///
/// Returns `None` for an empty string, a string without the expected
/// three-segment structure, a payload that is not base64url, or a payload
/// that is not a JSON object with a numeric `exp`.
#[must_use]
pub fn decode_expiry(raw: &str) -> Option<i64> {
    TokenClaims::decode(raw).and_then(|claims| claims.expires_at_ms)
}

fn payload_object(raw: &str) -> Option<Map<String, Value>> {
    let segments: Vec<&str> = raw.split('.').collect();
    if segments.len() != TOKEN_SEGMENTS {
        return None;
    }

    // Issuers disagree on padding; strip it and decode unpadded.
    let bytes = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .ok()?;

    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Credential grant returned by the login and refresh endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthGrant {
    /// The new access token.
    pub token: AccessToken,
    /// Role tag for the authenticated principal, if the server sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl AuthGrant {
    /// Role from the response body, falling back to the token's `role` claim.
    #[must_use]
    pub fn resolved_role(&self) -> Option<String> {
        self.role
            .clone()
            .or_else(|| self.token.claims().and_then(|claims| claims.role))
    }
}
