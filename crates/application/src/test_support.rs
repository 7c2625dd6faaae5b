//! In-memory port doubles shared by the unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use shopkeep_domain::{AccessToken, ClientSettings, RequestBody, ResponseSpec};
use tokio::sync::Semaphore;

use crate::api_client::ApiClient;
use crate::auth::{CredentialStore, RefreshCoordinator};
use crate::ports::{
    Clock, HttpTransport, KeyValueStorage, OutboundRequest, SessionListener, StorageError,
    TransportError,
};

const REFRESH_PATH: &str = "/auth/refresh";
const LOGIN_PATH: &str = "/auth/login";
const LOGOUT_PATH: &str = "/auth/logout";

/// Builds an unsigned JWT whose `exp` claim is `expires_at`.
pub fn jwt_expiring_at(expires_at: DateTime<Utc>) -> AccessToken {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = json!({ "sub": "user-1", "exp": expires_at.timestamp() });
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    AccessToken::new(format!("{header}.{payload}.signature"))
}

#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

pub struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Default)]
pub struct RecordingListener {
    ended: AtomicUsize,
    on_login_surface: AtomicBool,
}

impl RecordingListener {
    pub fn ended(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }

    pub fn set_on_login_surface(&self, value: bool) {
        self.on_login_surface.store(value, Ordering::SeqCst);
    }
}

impl SessionListener for RecordingListener {
    fn session_ended(&self) {
        self.ended.fetch_add(1, Ordering::SeqCst);
    }

    fn is_on_login_surface(&self) -> bool {
        self.on_login_surface.load(Ordering::SeqCst)
    }
}

/// How the mock backend answers `POST /auth/refresh`.
#[derive(Debug, Clone)]
pub enum RefreshBehavior {
    /// 200 with a grant. A `None` token issues `fresh-1`, `fresh-2`, ...
    Grant {
        token: Option<String>,
        role: Option<String>,
    },
    Status(u16),
    Transport(String),
    Body(String),
}

impl RefreshBehavior {
    pub fn grant(token: &str, role: Option<&str>) -> Self {
        Self::Grant {
            token: Some(token.to_string()),
            role: role.map(String::from),
        }
    }
}

impl Default for RefreshBehavior {
    fn default() -> Self {
        Self::Grant {
            token: None,
            role: None,
        }
    }
}

type Scripted = Result<ResponseSpec, TransportError>;

#[derive(Default)]
struct Backend {
    requests: Vec<OutboundRequest>,
    refresh: RefreshBehavior,
    refresh_calls: usize,
    issued: usize,
    valid_token: Option<String>,
    scripted: HashMap<String, VecDeque<Scripted>>,
    gate: Option<Arc<Semaphore>>,
}

/// Fake backend: resources accept only the current valid token, the refresh
/// endpoint follows a configurable [`RefreshBehavior`].
#[derive(Default)]
pub struct MockTransport {
    backend: Mutex<Backend>,
}

impl MockTransport {
    fn backend(&self) -> std::sync::MutexGuard<'_, Backend> {
        self.backend.lock().unwrap()
    }

    pub fn accept(&self, token: &str) {
        self.backend().valid_token = Some(token.to_string());
    }

    /// Makes every resource answer 401 until the next refresh.
    pub fn expire_token(&self) {
        self.backend().valid_token = None;
    }

    pub fn set_refresh(&self, behavior: RefreshBehavior) {
        self.backend().refresh = behavior;
    }

    /// Holds refresh calls until a permit is added to the returned semaphore.
    pub fn gate_refresh(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.backend().gate = Some(Arc::clone(&gate));
        gate
    }

    /// Queues a response for the next request to `path`.
    pub fn script(&self, path: &str, status: u16, body: &str) {
        self.push_scripted(path, Ok(response(status, body)));
    }

    /// Queues a transport failure for the next request to `path`.
    pub fn fail_path(&self, path: &str, message: &str) {
        self.push_scripted(
            path,
            Err(TransportError::ConnectionFailed(message.to_string())),
        );
    }

    fn push_scripted(&self, path: &str, outcome: Scripted) {
        self.backend()
            .scripted
            .entry(path.to_string())
            .or_default()
            .push_back(outcome);
    }

    pub fn refresh_calls(&self) -> usize {
        self.backend().refresh_calls
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.backend().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> usize {
        self.backend()
            .requests
            .iter()
            .filter(|request| request.url.path() == path)
            .count()
    }

    pub fn last_request(&self) -> Option<OutboundRequest> {
        self.backend().requests.last().cloned()
    }

    async fn refresh(&self) -> Scripted {
        let gate = self.backend().gate.clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut backend = self.backend();
        match backend.refresh.clone() {
            RefreshBehavior::Grant { token, role } => {
                backend.issued += 1;
                let token = token.unwrap_or_else(|| format!("fresh-{}", backend.issued));
                backend.valid_token = Some(token.clone());
                let body = match role {
                    Some(role) => json!({ "token": token, "role": role }),
                    None => json!({ "token": token }),
                };
                Ok(response(200, &body.to_string()))
            }
            RefreshBehavior::Status(status) => Ok(response(status, "")),
            RefreshBehavior::Transport(message) => Err(TransportError::ConnectionFailed(message)),
            RefreshBehavior::Body(body) => Ok(response(200, &body)),
        }
    }

    fn resource(&self, request: &OutboundRequest) -> ResponseSpec {
        let backend = self.backend();
        let authorized = request
            .bearer_token()
            .is_some_and(|token| backend.valid_token.as_deref() == Some(token));
        if !authorized {
            return response(401, r#"{"message":"token expired"}"#);
        }

        let body = match &request.body {
            RequestBody::Json(value) => value.clone(),
            _ => Value::Null,
        };
        let echo = json!({
            "path": request.url.path(),
            "method": request.method.as_str(),
            "body": body,
        });
        response(200, &echo.to_string())
    }
}

impl HttpTransport for MockTransport {
    fn execute(
        &self,
        request: &OutboundRequest,
    ) -> impl Future<Output = Result<ResponseSpec, TransportError>> + Send {
        let request = request.clone();
        async move {
            let path = request.url.path().to_string();
            let scripted = {
                let mut backend = self.backend();
                backend.requests.push(request.clone());
                if path == REFRESH_PATH {
                    backend.refresh_calls += 1;
                }
                backend.scripted.get_mut(&path).and_then(VecDeque::pop_front)
            };
            if let Some(outcome) = scripted {
                return outcome;
            }

            match path.as_str() {
                REFRESH_PATH => self.refresh().await,
                LOGIN_PATH => {
                    self.accept("login-token");
                    Ok(response(200, r#"{"token":"login-token","role":"customer"}"#))
                }
                LOGOUT_PATH => Ok(response(204, "")),
                _ => Ok(self.resource(&request)),
            }
        }
    }
}

fn response(status: u16, body: &str) -> ResponseSpec {
    let headers = HashMap::from([("Content-Type".to_string(), "application/json".to_string())]);
    ResponseSpec::new(
        status,
        headers,
        body.as_bytes().to_vec(),
        Duration::from_millis(1),
    )
}

/// A fully wired client against [`MockTransport`].
pub struct Harness {
    pub transport: Arc<MockTransport>,
    pub storage: Arc<MemoryStorage>,
    pub credentials: CredentialStore,
    pub coordinator: Arc<RefreshCoordinator<MockTransport>>,
    pub client: ApiClient<MockTransport>,
    pub listener: Arc<RecordingListener>,
    pub clock: Arc<FixedClock>,
    pub settings: ClientSettings,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(configure: impl FnOnce(&mut ClientSettings)) -> Self {
        let mut settings = ClientSettings::with_base_url("http://shop.test");
        configure(&mut settings);
        let shared = Arc::new(settings.clone());

        let transport = Arc::new(MockTransport::default());
        let storage = Arc::new(MemoryStorage::default());
        let credentials = CredentialStore::new(storage.clone());
        let listener = Arc::new(RecordingListener::default());
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&transport),
            credentials.clone(),
            listener.clone(),
            Arc::clone(&shared),
        ));
        let client = ApiClient::new(
            Arc::clone(&transport),
            credentials.clone(),
            Arc::clone(&coordinator),
            shared,
        );
        let clock = Arc::new(FixedClock(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));

        Self {
            transport,
            storage,
            credentials,
            coordinator,
            client,
            listener,
            clock,
            settings,
        }
    }

    /// Stores `token` and makes the backend accept it.
    pub async fn login(&self, token: &str) {
        self.credentials
            .set_token(AccessToken::new(token), None)
            .await
            .unwrap();
        self.transport.accept(token);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn wait_for_waiters(&self, count: usize) {
        while self.coordinator.waiting() < count {
            tokio::task::yield_now().await;
        }
    }

    pub async fn wait_for_refresh_calls(&self, count: usize) {
        while self.transport.refresh_calls() < count {
            tokio::task::yield_now().await;
        }
    }
}
