#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use portal_storage::MemoryStore;
use serde_json::{json, Value};
use session_coordinator::{
    AdminRole, ApiRequest, ApiTransport, AuthBackend, AuthError, AuthResult, CapabilityModel,
    Credentials, ExchangeToken, Grant, LoginOutcome, ManagerCapabilities, Navigator, Principal,
    RealmConfig, Session, SessionCoordinator, SessionStore,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// JWT-shaped token expiring `secs` from now. `tag` keeps tokens distinct.
pub fn token(tag: &str, secs: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + secs;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{}","exp":{}}}"#, tag, exp));
    format!("{}.{}.{}", header, payload, tag)
}

pub fn manager_principal(tenant: Option<&str>) -> Principal<ManagerCapabilities> {
    Principal {
        id: "manager-1".to_string(),
        username: "jane".to_string(),
        display_name: "Jane Doe".to_string(),
        tenant_id: tenant.map(str::to_string),
        capabilities: ManagerCapabilities {
            membership: true,
            finance: true,
            ..Default::default()
        },
    }
}

pub fn admin_principal(role: AdminRole) -> Principal<AdminRole> {
    Principal {
        id: "admin-1".to_string(),
        username: "root".to_string(),
        display_name: "Root".to_string(),
        tenant_id: None,
        capabilities: role,
    }
}

pub fn grant<C: CapabilityModel>(token: String, principal: Principal<C>) -> Grant<C> {
    Grant { token, principal }
}

pub fn credentials() -> Credentials {
    Credentials::new("jane", "correct horse")
}

/// Scripted backend. Each endpoint pops its next result; refresh can be held
/// at a gate until the test releases it.
pub struct FakeBackend<C> {
    login_results: Mutex<VecDeque<AuthResult<LoginOutcome<C>>>>,
    verify_results: Mutex<VecDeque<AuthResult<LoginOutcome<C>>>>,
    reset_results: Mutex<VecDeque<AuthResult<Grant<C>>>>,
    refresh_results: Mutex<VecDeque<AuthResult<Grant<C>>>>,
    refresh_gate: Option<Arc<Semaphore>>,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub verify_calls: Mutex<Vec<(String, String)>>,
    pub reset_calls: Mutex<Vec<(String, String)>>,
}

impl<C: CapabilityModel> FakeBackend<C> {
    pub fn new() -> Self {
        Self {
            login_results: Mutex::new(VecDeque::new()),
            verify_results: Mutex::new(VecDeque::new()),
            reset_results: Mutex::new(VecDeque::new()),
            refresh_results: Mutex::new(VecDeque::new()),
            refresh_gate: None,
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            verify_calls: Mutex::new(Vec::new()),
            reset_calls: Mutex::new(Vec::new()),
        }
    }

    /// Refresh calls block until [`FakeBackend::release_refresh`].
    pub fn gated() -> Self {
        Self {
            refresh_gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new()
        }
    }

    pub fn release_refresh(&self) {
        if let Some(gate) = &self.refresh_gate {
            gate.add_permits(1);
        }
    }

    pub fn push_login(&self, result: AuthResult<LoginOutcome<C>>) {
        self.login_results.lock().push_back(result);
    }

    pub fn push_verify(&self, result: AuthResult<LoginOutcome<C>>) {
        self.verify_results.lock().push_back(result);
    }

    pub fn push_reset(&self, result: AuthResult<Grant<C>>) {
        self.reset_results.lock().push_back(result);
    }

    pub fn push_refresh(&self, result: AuthResult<Grant<C>>) {
        self.refresh_results.lock().push_back(result);
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    fn pop<T>(queue: &Mutex<VecDeque<AuthResult<T>>>) -> AuthResult<T> {
        queue
            .lock()
            .pop_front()
            .unwrap_or(Err(AuthError::Transport("no scripted response".to_string())))
    }
}

#[async_trait]
impl<C: CapabilityModel> AuthBackend<C> for FakeBackend<C> {
    async fn login(&self, _credentials: &Credentials) -> AuthResult<LoginOutcome<C>> {
        Self::pop(&self.login_results)
    }

    async fn verify_two_factor(
        &self,
        exchange: &ExchangeToken,
        code: &str,
    ) -> AuthResult<LoginOutcome<C>> {
        self.verify_calls
            .lock()
            .push((exchange.expose().to_string(), code.to_string()));
        Self::pop(&self.verify_results)
    }

    async fn force_change_secret(
        &self,
        exchange: &ExchangeToken,
        new_secret: &str,
    ) -> AuthResult<Grant<C>> {
        self.reset_calls
            .lock()
            .push((exchange.expose().to_string(), new_secret.to_string()));
        Self::pop(&self.reset_results)
    }

    async fn refresh_token(&self) -> AuthResult<Grant<C>> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.refresh_gate {
            gate.acquire().await.unwrap().forget();
        }
        self.refresh_results
            .lock()
            .pop_front()
            .unwrap_or(Err(AuthError::Unauthenticated))
    }

    async fn logout(&self, _access_token: Option<&str>) -> AuthResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub path: String,
    pub token: Option<String>,
}

/// Accepts only tokens it has been told about; records every call.
#[derive(Default)]
pub struct FakeTransport {
    accepted: Mutex<HashSet<String>>,
    failures: Mutex<HashMap<String, AuthError>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeTransport {
    pub fn accept(&self, token: &str) {
        self.accepted.lock().insert(token.to_string());
    }

    pub fn fail(&self, path: &str, err: AuthError) {
        self.failures.lock().insert(path.to_string(), err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Paths sent with `token`, in dispatch order.
    pub fn paths_with_token(&self, token: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.token.as_deref() == Some(token))
            .map(|call| call.path.clone())
            .collect()
    }
}

#[async_trait]
impl ApiTransport for FakeTransport {
    async fn execute(&self, request: &ApiRequest, access_token: Option<&str>) -> AuthResult<Value> {
        self.calls.lock().push(Call {
            path: request.path.clone(),
            token: access_token.map(str::to_string),
        });

        if let Some(err) = self.failures.lock().get(&request.path) {
            return Err(err.clone());
        }

        match access_token {
            Some(token) if self.accepted.lock().contains(token) => {
                Ok(json!({ "path": request.path }))
            }
            _ => Err(AuthError::Unauthenticated),
        }
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn go_to(&self, path: &str) {
        self.redirects.lock().push(path.to_string());
    }
}

pub struct Harness<C: CapabilityModel> {
    pub coordinator: SessionCoordinator<C>,
    pub backend: Arc<FakeBackend<C>>,
    pub transport: Arc<FakeTransport>,
    pub navigator: Arc<RecordingNavigator>,
    pub storage: Arc<MemoryStore>,
}

impl<C: CapabilityModel> Harness<C> {
    pub fn new(realm: RealmConfig, backend: FakeBackend<C>) -> Self {
        let backend = Arc::new(backend);
        let transport = Arc::new(FakeTransport::default());
        let navigator = Arc::new(RecordingNavigator::default());
        let storage = Arc::new(MemoryStore::new());

        let coordinator = SessionCoordinator::new(
            realm,
            backend.clone(),
            transport.clone(),
            storage.clone(),
            navigator.clone(),
        );

        Self {
            coordinator,
            backend,
            transport,
            navigator,
            storage,
        }
    }

    /// Persist a session as if a previous run had logged in.
    pub fn seed_session(&self, token: &str, principal: Principal<C>) {
        let store: SessionStore<C> = SessionStore::new(self.storage.clone());
        store.save(&Session::new(token, principal).unwrap()).unwrap();
    }
}

/// Yield to other tasks until `condition` holds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
