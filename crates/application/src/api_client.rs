//! Authenticated request executor.
//!
//! Every call goes through [`ApiClient::execute`], which attaches the current
//! credential, and on a 401 asks the shared [`RefreshCoordinator`] for a new
//! one and resends the same request once.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use shopkeep_domain::{
    AccessToken, AuthGrant, ClientSettings, HttpMethod, MultipartForm, PendingRequest,
    RequestBody, ResponseSpec,
};

use crate::auth::{CredentialStore, RefreshCoordinator};
use crate::error::{ApiError, ApiResult};
use crate::ports::{HttpTransport, OutboundRequest};

/// How many times a request is resent after a credential refresh.
const MAX_AUTH_RETRIES: u8 = 1;

/// Client for the backend API.
pub struct ApiClient<T> {
    transport: Arc<T>,
    credentials: CredentialStore,
    coordinator: Arc<RefreshCoordinator<T>>,
    settings: Arc<ClientSettings>,
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            credentials: self.credentials.clone(),
            coordinator: Arc::clone(&self.coordinator),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<T: HttpTransport + 'static> ApiClient<T> {
    /// Creates a client. `coordinator` must share `transport` and
    /// `credentials` with this client.
    pub const fn new(
        transport: Arc<T>,
        credentials: CredentialStore,
        coordinator: Arc<RefreshCoordinator<T>>,
        settings: Arc<ClientSettings>,
    ) -> Self {
        Self {
            transport,
            credentials,
            coordinator,
            settings,
        }
    }

    /// The credential store this client reads from.
    pub const fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Sends a GET with the given query parameters.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn get<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ApiResult<R> {
        let request = query
            .iter()
            .fold(PendingRequest::get(path), |request, (name, value)| {
                request.with_query(*name, *value)
            });
        self.send(request).await
    }

    /// Sends a POST with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn post<B, R>(&self, path: &str, body: &B) -> ApiResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(PendingRequest::post(path, encode(body)?)).await
    }

    /// Sends a PUT with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn put<B, R>(&self, path: &str, body: &B) -> ApiResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(PendingRequest::put(path, encode(body)?)).await
    }

    /// Sends a PATCH with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn patch<B, R>(&self, path: &str, body: &B) -> ApiResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = PendingRequest::new(HttpMethod::Patch, path).with_body(encode(body)?);
        self.send(request).await
    }

    /// Sends a DELETE.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn delete<R: DeserializeOwned>(&self, path: &str) -> ApiResult<R> {
        self.send(PendingRequest::delete(path)).await
    }

    /// Uploads a multipart form.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn upload<R: DeserializeOwned>(
        &self,
        path: &str,
        form: MultipartForm,
    ) -> ApiResult<R> {
        self.send(PendingRequest::upload(path, form)).await
    }

    /// Executes `request` and decodes a 2xx body as `R`.
    ///
    /// An empty body decodes as JSON `null`, so `()` and `Option<_>` work
    /// for 204 responses.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` for non-2xx responses, `ApiError::Decode`
    /// if the body does not match `R`, and anything [`execute`](Self::execute)
    /// returns.
    pub async fn send<R: DeserializeOwned>(&self, request: PendingRequest) -> ApiResult<R> {
        let response = self.execute(&request).await?;
        if !response.is_success() {
            return Err(ApiError::from_response(&response));
        }
        response
            .json()
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Sends `request`, refreshing the credential and resending once on 401.
    ///
    /// The returned response may have any status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built, no response arrives,
    /// the refresh fails, or a non-idempotent replay is disabled.
    pub async fn execute(&self, request: &PendingRequest) -> ApiResult<ResponseSpec> {
        let mut retries = 0;
        loop {
            let sent = self.credentials.get_token().await;
            let outbound = self.build(request, sent.as_ref())?;

            tracing::debug!(method = %request.method, path = %request.path, "sending request");
            let response = self.transport.execute(&outbound).await?;
            tracing::debug!(
                status = response.status,
                elapsed = ?response.duration,
                "response received"
            );

            if !response.is_unauthorized()
                || retries >= MAX_AUTH_RETRIES
                || self.is_auth_endpoint(request)
            {
                return Ok(response);
            }

            let current = self.credentials.get_token().await;
            match current {
                None => return Ok(response),
                // Another caller already renewed the credential.
                Some(current) if sent.as_ref() != Some(&current) => {}
                Some(_) => {
                    tracing::debug!(path = %request.path, "credential rejected, refreshing");
                    self.coordinator.refresh().await?;
                }
            }

            if !request.method.is_idempotent() && !self.settings.retry_non_idempotent {
                return Err(ApiError::ReplayRefused {
                    method: request.method,
                    path: request.path.clone(),
                });
            }
            retries += 1;
        }
    }

    /// Signs in and stores the returned credential.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` if the credentials are rejected, and
    /// `ApiError::Storage` if the credential cannot be persisted (it is still
    /// held in memory).
    pub async fn login<B: Serialize + ?Sized>(&self, credentials: &B) -> ApiResult<AuthGrant> {
        let request =
            PendingRequest::post(self.settings.login_path.as_str(), encode(credentials)?);
        let grant: AuthGrant = self.send(request).await?;
        let role = grant.resolved_role();

        self.credentials
            .set_token(grant.token.clone(), role.clone())
            .await?;
        tracing::info!(
            token = %grant.token.preview(),
            role = role.as_deref().unwrap_or("none"),
            "signed in"
        );
        Ok(AuthGrant {
            token: grant.token,
            role,
        })
    }

    /// Tells the backend the session is over, then clears the credential.
    ///
    /// The credential is cleared even when the backend call fails.
    ///
    /// # Errors
    ///
    /// Returns the backend or storage failure, after clearing.
    pub async fn logout(&self) -> ApiResult<()> {
        let token = self.credentials.get_token().await;
        let request = PendingRequest::new(HttpMethod::Post, self.settings.logout_path.as_str());
        let notified = match self.build(&request, token.as_ref()) {
            Ok(outbound) => self
                .transport
                .execute(&outbound)
                .await
                .map_err(ApiError::from)
                .and_then(|response| {
                    if response.is_success() {
                        Ok(())
                    } else {
                        Err(ApiError::from_response(&response))
                    }
                }),
            Err(error) => Err(error),
        };

        self.credentials.clear().await?;
        match &notified {
            Ok(()) => tracing::info!("signed out"),
            Err(error) => tracing::warn!(%error, "signed out locally, backend logout failed"),
        }
        notified
    }

    fn is_auth_endpoint(&self, request: &PendingRequest) -> bool {
        request.targets(&self.settings.login_path) || request.targets(&self.settings.refresh_path)
    }

    fn build(
        &self,
        request: &PendingRequest,
        token: Option<&AccessToken>,
    ) -> ApiResult<OutboundRequest> {
        let url = request.resolve_url(&self.settings.base_url)?;
        let mut outbound =
            OutboundRequest::new(request.method, url, self.settings.request_timeout());
        outbound.headers.clone_from(&request.headers);
        if let Some(content_type) = request.body.content_type() {
            outbound
                .headers
                .insert("Content-Type".to_string(), content_type.to_string());
        }
        if let Some(token) = token {
            outbound
                .headers
                .insert("Authorization".to_string(), token.bearer_header());
        }
        outbound.body = request.body.clone();
        Ok(outbound)
    }
}

impl<T> fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.settings.base_url)
            .finish_non_exhaustive()
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> ApiResult<RequestBody> {
    RequestBody::json(body).map_err(|e| ApiError::Encode(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::TOKEN_KEY;
    use crate::error::RefreshError;
    use crate::test_support::{Harness, RefreshBehavior};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use tokio::task::JoinSet;

    #[tokio::test]
    async fn get_attaches_bearer_token() {
        let harness = Harness::new();
        harness.login("valid-token-123").await;

        let body: Value = harness
            .client
            .get("/products", &[("page", "2")])
            .await
            .unwrap();

        assert_eq!(body["path"], "/products");
        let request = harness.transport.last_request().unwrap();
        assert_eq!(request.header("authorization"), Some("Bearer valid-token-123"));
        assert_eq!(request.url.query(), Some("page=2"));
    }

    #[tokio::test]
    async fn header_is_omitted_without_a_token() {
        let harness = Harness::new();
        harness.transport.script("/catalog", 200, r#"{"items":[]}"#);

        let body: Value = harness.client.get("/catalog", &[]).await.unwrap();

        assert_eq!(body, json!({"items": []}));
        let request = harness.transport.last_request().unwrap();
        assert_eq!(request.header("authorization"), None);
        assert_eq!(harness.transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn json_body_sets_content_type() {
        let harness = Harness::new();
        harness.login("valid-token-123").await;

        let _: Value = harness
            .client
            .put("/cart/1", &json!({"qty": 3}))
            .await
            .unwrap();

        let request = harness.transport.last_request().unwrap();
        assert_eq!(request.method, HttpMethod::Put);
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.body, RequestBody::Json(json!({"qty": 3})));
    }

    #[tokio::test]
    async fn upload_leaves_content_type_to_the_transport() {
        let harness = Harness::new();
        harness.login("valid-token-123").await;
        let form = MultipartForm::new()
            .text("title", "Red shoes")
            .file("image", "shoes.png", None, vec![1, 2, 3]);

        let _: Value = harness.client.upload("/products/7/image", form).await.unwrap();

        let request = harness.transport.last_request().unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.header("content-type"), None);
        assert!(matches!(request.body, RequestBody::Multipart(_)));
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_request_resent() {
        let harness = Harness::new();
        harness.login("stale").await;
        harness.transport.expire_token();

        let body: Value = harness
            .client
            .post("/orders", &json!({"sku": "A-1", "qty": 2}))
            .await
            .unwrap();

        assert_eq!(body["method"], "POST");
        assert_eq!(body["body"], json!({"sku": "A-1", "qty": 2}));
        assert_eq!(harness.transport.refresh_calls(), 1);

        let orders: Vec<OutboundRequest> = harness
            .transport
            .requests()
            .into_iter()
            .filter(|r| r.url.path() == "/orders")
            .collect();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].bearer_token(), Some("stale"));
        assert_eq!(orders[1].bearer_token(), Some("fresh-1"));
        assert_eq!(orders[0].method, orders[1].method);
        assert_eq!(orders[0].url, orders[1].url);
        assert_eq!(orders[0].body, orders[1].body);
    }

    #[tokio::test]
    async fn second_unauthorized_is_an_error_not_a_loop() {
        let harness = Harness::new();
        harness.login("stale").await;
        harness.transport.expire_token();
        harness.transport.script("/orders", 401, r#"{"message":"token expired"}"#);
        harness.transport.script("/orders", 401, r#"{"message":"still expired"}"#);

        let error = harness
            .client
            .get::<Value>("/orders", &[])
            .await
            .unwrap_err();

        assert_eq!(error.status(), Some(401));
        assert_eq!(error.to_string(), "still expired");
        assert_eq!(harness.transport.refresh_calls(), 1);
        assert_eq!(harness.transport.requests_to("/orders"), 2);
    }

    #[tokio::test]
    async fn login_is_never_retried() {
        let harness = Harness::new();
        harness.login("stale").await;
        harness
            .transport
            .script("/auth/login", 401, r#"{"message":"Invalid credentials"}"#);

        let error = harness
            .client
            .login(&json!({"email": "a@b.c", "password": "nope"}))
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "Invalid credentials");
        assert_eq!(harness.transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn login_stores_token_and_role() {
        let harness = Harness::new();
        harness.transport.script(
            "/auth/login",
            200,
            r#"{"token":"login-token-abc","role":"customer"}"#,
        );

        let grant = harness
            .client
            .login(&json!({"email": "a@b.c", "password": "pw"}))
            .await
            .unwrap();

        assert_eq!(grant.token, AccessToken::new("login-token-abc"));
        assert_eq!(
            harness.credentials.get_token().await,
            Some(AccessToken::new("login-token-abc"))
        );
        assert_eq!(harness.credentials.role().await.as_deref(), Some("customer"));
        assert_eq!(
            harness.storage.value(TOKEN_KEY).as_deref(),
            Some("login-token-abc")
        );
        let request = harness.transport.last_request().unwrap();
        assert_eq!(request.header("authorization"), None);
    }

    #[tokio::test]
    async fn unauthorized_without_token_is_not_refreshed() {
        let harness = Harness::new();

        let error = harness
            .client
            .get::<Value>("/orders", &[])
            .await
            .unwrap_err();

        assert_eq!(error.status(), Some(401));
        assert_eq!(harness.transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn replay_can_be_disabled_for_non_idempotent_requests() {
        let harness = Harness::with_settings(|settings| settings.retry_non_idempotent = false);
        harness.login("stale").await;
        harness.transport.expire_token();

        let error = harness
            .client
            .post::<_, Value>("/orders", &json!({"sku": "A-1"}))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            ApiError::ReplayRefused {
                method: HttpMethod::Post,
                ..
            }
        ));
        assert_eq!(harness.transport.refresh_calls(), 1);
        assert_eq!(harness.transport.requests_to("/orders"), 1);
        assert_eq!(
            harness.credentials.get_token().await,
            Some(AccessToken::new("fresh-1"))
        );

        let body: Value = harness.client.get("/orders", &[]).await.unwrap();
        assert_eq!(body["method"], "GET");
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_session_expired() {
        let harness = Harness::new();
        harness.login("stale").await;
        harness.transport.expire_token();
        harness.transport.set_refresh(RefreshBehavior::Status(401));

        let error = harness
            .client
            .get::<Value>("/orders", &[])
            .await
            .unwrap_err();

        assert!(error.is_session_expired());
        assert!(matches!(
            error,
            ApiError::Refresh(RefreshError::Rejected { status: 401, .. })
        ));
        assert_eq!(harness.credentials.get_token().await, None);
        assert_eq!(harness.listener.ended(), 1);
    }

    #[tokio::test]
    async fn concurrent_unauthorized_requests_share_one_failed_refresh() {
        let harness = Harness::new();
        harness.login("stale").await;
        harness.transport.expire_token();
        harness.transport.set_refresh(RefreshBehavior::Status(401));
        let gate = harness.transport.gate_refresh();

        let mut callers = JoinSet::new();
        for i in 0..5 {
            let client = harness.client.clone();
            callers.spawn(async move { client.get::<Value>(&format!("/orders/{i}"), &[]).await });
        }
        harness.wait_for_waiters(4).await;
        gate.add_permits(1);

        while let Some(result) = callers.join_next().await {
            assert!(result.unwrap().unwrap_err().is_session_expired());
        }

        assert_eq!(harness.transport.refresh_calls(), 1);
        assert_eq!(harness.listener.ended(), 1);
        assert_eq!(harness.credentials.get_token().await, None);
    }

    #[tokio::test]
    async fn concurrent_unauthorized_requests_share_one_refresh() {
        let harness = Harness::new();
        harness.login("stale").await;
        harness.transport.expire_token();
        let gate = harness.transport.gate_refresh();

        let mut callers = JoinSet::new();
        for i in 0..5 {
            let client = harness.client.clone();
            callers.spawn(async move { client.get::<Value>(&format!("/orders/{i}"), &[]).await });
        }
        harness.wait_for_waiters(4).await;
        gate.add_permits(1);

        while let Some(result) = callers.join_next().await {
            let body = result.unwrap().unwrap();
            assert_eq!(body["method"], "GET");
        }
        assert_eq!(harness.transport.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn aborted_request_does_not_fail_requests_waiting_on_its_refresh() {
        let harness = Harness::new();
        harness.login("stale").await;
        harness.transport.expire_token();
        let gate = harness.transport.gate_refresh();

        let first = {
            let client = harness.client.clone();
            tokio::spawn(async move { client.get::<Value>("/orders/1", &[]).await })
        };
        harness.wait_for_refresh_calls(1).await;
        let second = {
            let client = harness.client.clone();
            tokio::spawn(async move { client.get::<Value>("/orders/2", &[]).await })
        };
        harness.wait_for_waiters(1).await;

        first.abort();
        gate.add_permits(1);

        let body = second.await.unwrap().unwrap();
        assert_eq!(body["path"], "/orders/2");
        assert_eq!(
            harness.credentials.get_token().await,
            Some(AccessToken::new("fresh-1"))
        );
        assert_eq!(harness.transport.refresh_calls(), 1);
        assert_eq!(harness.listener.ended(), 0);
    }

    #[tokio::test]
    async fn server_error_message_is_surfaced() {
        let harness = Harness::new();
        harness.login("valid-token-123").await;
        harness
            .transport
            .script("/cart", 409, r#"{"error":"Cart is locked"}"#);
        harness.transport.script("/cart", 500, "<html>oops</html>");

        let first = harness.client.delete::<()>("/cart").await.unwrap_err();
        let second = harness.client.delete::<()>("/cart").await.unwrap_err();

        assert_eq!(first.to_string(), "Cart is locked");
        assert_eq!(second.to_string(), "API error: 500");
        assert_eq!(harness.transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn empty_success_body_decodes_as_unit() {
        let harness = Harness::new();
        harness.login("valid-token-123").await;
        harness.transport.script("/cart/1", 204, "");

        harness.client.delete::<()>("/cart/1").await.unwrap();
    }

    #[tokio::test]
    async fn undecodable_body_is_a_decode_error() {
        let harness = Harness::new();
        harness.login("valid-token-123").await;
        harness.transport.script("/products", 200, "not json");

        let error = harness
            .client
            .get::<Value>("/products", &[])
            .await
            .unwrap_err();

        assert!(matches!(error, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn transport_failure_is_not_retried() {
        let harness = Harness::new();
        harness.login("valid-token-123").await;
        harness.transport.fail_path("/products", "connection refused");

        let error = harness
            .client
            .get::<Value>("/products", &[])
            .await
            .unwrap_err();

        assert!(matches!(error, ApiError::Transport(_)));
        assert_eq!(harness.transport.requests_to("/products"), 1);
    }

    #[tokio::test]
    async fn logout_clears_credentials_even_when_backend_fails() {
        let harness = Harness::new();
        harness.login("valid-token-123").await;
        harness.transport.script("/auth/logout", 500, "");

        let result = harness.client.logout().await;

        assert!(result.is_err());
        assert_eq!(harness.credentials.get_token().await, None);
        let request = harness.transport.last_request().unwrap();
        assert_eq!(request.url.path(), "/auth/logout");
        assert_eq!(request.bearer_token(), Some("valid-token-123"));
    }

    #[tokio::test]
    async fn logout_succeeds() {
        let harness = Harness::new();
        harness.login("valid-token-123").await;

        harness.client.logout().await.unwrap();

        assert_eq!(harness.credentials.get_token().await, None);
        assert_eq!(harness.credentials.role().await, None);
    }
}
