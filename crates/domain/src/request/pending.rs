//! Replayable request descriptor

use std::collections::BTreeMap;

use url::Url;

use super::{HttpMethod, MultipartForm, RequestBody};
use crate::error::{DomainError, DomainResult};

/// A replay-capable snapshot of one logical API call.
///
/// The descriptor holds everything except the credential, which is attached
/// at send time. Sending the same descriptor twice produces identical
/// method, path, query, headers and body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PendingRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Path relative to the API base URL
    pub path: String,
    /// Query parameters, in order
    pub query: Vec<(String, String)>,
    /// Extra headers, excluding `Authorization` and `Content-Type`
    pub headers: BTreeMap<String, String>,
    /// Request body
    pub body: RequestBody,
}

impl PendingRequest {
    /// Creates a request with no query, headers or body.
    #[must_use]
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Self::default()
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// Creates a POST request with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: RequestBody) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    /// Creates a PUT request with a JSON body.
    #[must_use]
    pub fn put(path: impl Into<String>, body: RequestBody) -> Self {
        Self::new(HttpMethod::Put, path).with_body(body)
    }

    /// Creates a DELETE request.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Creates a multipart upload, sent as POST.
    #[must_use]
    pub fn upload(path: impl Into<String>, form: MultipartForm) -> Self {
        Self::new(HttpMethod::Post, path).with_body(RequestBody::Multipart(form))
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Sets an extra header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Returns whether the request targets `endpoint`, ignoring surrounding
    /// slashes and any query string.
    #[must_use]
    pub fn targets(&self, endpoint: &str) -> bool {
        let path = self.path.split('?').next().unwrap_or_default();
        path.trim_matches('/') == endpoint.trim_matches('/')
    }

    /// Resolves the absolute URL against `base_url`, including query parameters.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidUrl` if the joined URL does not parse.
    pub fn resolve_url(&self, base_url: &str) -> DomainResult<Url> {
        let joined = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        let mut url = Url::parse(&joined)
            .map_err(|e| DomainError::InvalidUrl(format!("{e}: {joined}")))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}
