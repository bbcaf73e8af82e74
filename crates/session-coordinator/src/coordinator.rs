//! Session coordinator: one generic implementation serving every realm.
//!
//! A [`SessionCoordinator`] owns the login state machine and wires the
//! session store, tenant resolver, refresh coordinator and expiry monitor
//! together. The admin and manager realms are two instantiations that differ
//! only in [`RealmConfig`] and the capability model.

use crate::auth_fsm::{AuthState, AuthStateChangedPayload, LoginMachine, LoginMachineInput};
use crate::backend::{is_auth_endpoint, AuthBackend, Credentials, ExchangeToken, Grant, LoginOutcome};
use crate::capabilities::CapabilityModel;
use crate::expiry::{ExpiryMonitor, ExpiryPolicy};
use crate::navigation::{Location, Navigator};
use crate::refresh::{RefreshCoordinator, SessionEvent};
use crate::request::{ApiRequest, ApiTransport};
use crate::session::{Principal, Session, SessionStore};
use crate::tenant::{TenantContext, TenantResolver};
use crate::{AuthError, AuthResult};
use chrono::Utc;
use parking_lot::Mutex;
use portal_storage::KeyValueStore;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

pub const DEFAULT_MANAGEMENT_KEYWORD: &str = "system-manager";

/// Callback type for auth state change notifications.
pub type AuthStateCallback = Box<dyn Fn(AuthStateChangedPayload) + Send + Sync>;

/// Per-realm parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmConfig {
    pub name: String,
    /// Whether API paths and redirects are scoped by the tenant slug.
    pub tenant_aware: bool,
    /// Path segment that marks the management area.
    pub management_keyword: String,
    pub expiry: ExpiryPolicy,
}

impl RealmConfig {
    /// Platform administrators: always global.
    pub fn admin() -> Self {
        Self {
            name: "admin".to_string(),
            tenant_aware: false,
            management_keyword: DEFAULT_MANAGEMENT_KEYWORD.to_string(),
            expiry: ExpiryPolicy::default(),
        }
    }

    /// Organization managers: tenant-scoped.
    pub fn manager() -> Self {
        Self {
            name: "manager".to_string(),
            tenant_aware: true,
            management_keyword: DEFAULT_MANAGEMENT_KEYWORD.to_string(),
            expiry: ExpiryPolicy::default(),
        }
    }

    pub fn with_management_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.management_keyword = keyword.into();
        self
    }

    pub fn with_expiry(mut self, expiry: ExpiryPolicy) -> Self {
        self.expiry = expiry;
        self
    }
}

struct CoordinatorInner<C: CapabilityModel> {
    realm: RealmConfig,
    resolver: TenantResolver,
    backend: Arc<dyn AuthBackend<C>>,
    transport: Arc<dyn ApiTransport>,
    store: Arc<SessionStore<C>>,
    location: Arc<Location>,
    refresh: RefreshCoordinator<C>,
    monitor: ExpiryMonitor,
    fsm: Mutex<LoginMachine>,
    /// Links the steps of a multi-step login. Memory only.
    exchange: Mutex<Option<ExchangeToken>>,
    state_callback: Mutex<Option<AuthStateCallback>>,
}

pub struct SessionCoordinator<C: CapabilityModel> {
    inner: Arc<CoordinatorInner<C>>,
}

impl<C: CapabilityModel> Clone for SessionCoordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: CapabilityModel> SessionCoordinator<C> {
    pub fn new(
        realm: RealmConfig,
        backend: Arc<dyn AuthBackend<C>>,
        transport: Arc<dyn ApiTransport>,
        storage: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let resolver = TenantResolver::new(realm.management_keyword.clone(), realm.tenant_aware);
        let store = Arc::new(SessionStore::new(storage));
        let location = Arc::new(Location::default());
        let refresh = RefreshCoordinator::new(
            backend.clone(),
            store.clone(),
            resolver.clone(),
            location.clone(),
            navigator,
        );
        let monitor = ExpiryMonitor::new(realm.expiry, Arc::new(refresh.clone()));

        let inner = Arc::new(CoordinatorInner {
            realm,
            resolver,
            backend,
            transport,
            store,
            location,
            refresh,
            monitor,
            fsm: Mutex::new(LoginMachine::new()),
            exchange: Mutex::new(None),
            state_callback: Mutex::new(None),
        });

        let weak: Weak<CoordinatorInner<C>> = Arc::downgrade(&inner);
        inner.refresh.set_session_callback(Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_session_event(event);
            }
        }));

        Self { inner }
    }

    pub fn realm(&self) -> &RealmConfig {
        &self.inner.realm
    }

    pub fn set_state_callback(&self, callback: AuthStateCallback) {
        *self.inner.state_callback.lock() = Some(callback);
    }

    pub fn state(&self) -> AuthState {
        AuthState::from(self.inner.fsm.lock().state())
    }

    /// Pick up a persisted session at startup. Must be called from within a
    /// Tokio runtime because it arms the expiry monitor.
    pub fn restore(&self) -> AuthResult<bool> {
        let Some(session) = self.inner.store.load() else {
            debug!(realm = %self.inner.realm.name, "No stored session");
            return Ok(false);
        };

        self.inner.transition(&LoginMachineInput::Restore)?;
        self.inner.monitor.schedule(session.expires_at());
        info!(
            realm = %self.inner.realm.name,
            user_id = %session.principal().id,
            expires_at = %session.expires_at(),
            expired = session.is_expired_at(Utc::now()),
            "Session restored"
        );
        Ok(true)
    }

    /// First login step.
    pub async fn login(&self, credentials: &Credentials) -> AuthResult<AuthState> {
        self.inner.transition(&LoginMachineInput::Submit)?;
        debug!(realm = %self.inner.realm.name, username = %credentials.username, "Submitting credentials");

        let result = match self.inner.backend.login(credentials).await {
            Ok(outcome) => self.inner.apply_outcome(outcome),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            warn!(realm = %self.inner.realm.name, error = %e, "Login failed");
            self.inner.settle(&LoginMachineInput::Rejected);
        }
        result
    }

    pub async fn verify_two_factor(&self, code: &str) -> AuthResult<AuthState> {
        let exchange = self.inner.pending_exchange(AuthState::TwoFactorPending)?;

        if code.trim().is_empty() {
            return self.inner.reject_step("Verification code is required");
        }

        match self.inner.backend.verify_two_factor(&exchange, code.trim()).await {
            Ok(outcome) => self.inner.apply_outcome(outcome),
            Err(e) => Err(self.inner.step_failed(e)),
        }
    }

    /// Complete a forced secret reset. `confirm` must repeat `new_secret`.
    pub async fn force_change_secret(
        &self,
        new_secret: &str,
        confirm: &str,
    ) -> AuthResult<AuthState> {
        let exchange = self
            .inner
            .pending_exchange(AuthState::ForcedSecretResetPending)?;

        if new_secret.is_empty() {
            return self.inner.reject_step("New password is required");
        }
        if new_secret != confirm {
            return self.inner.reject_step("Passwords do not match");
        }

        match self
            .inner
            .backend
            .force_change_secret(&exchange, new_secret)
            .await
        {
            Ok(grant) => self.inner.establish(grant),
            Err(e) => Err(self.inner.step_failed(e)),
        }
    }

    /// Drop the session. Safe to call in any state and any number of times;
    /// local state is cleared even if the backend cannot be reached.
    pub async fn logout(&self) -> AuthResult<()> {
        let access_token = self.inner.store.access_token();

        let rejected = self.inner.refresh.reject_pending();
        self.inner.monitor.cancel();
        self.inner.exchange.lock().take();
        let cleared = self.inner.store.clear();
        self.inner.settle(&LoginMachineInput::Logout);

        if let Err(e) = self.inner.backend.logout(access_token.as_deref()).await {
            warn!(error = %e, "Backend logout failed; local session cleared anyway");
        }

        info!(realm = %self.inner.realm.name, rejected, "Logged out");
        cleared
    }

    /// Send an API request under the current tenant, refreshing on 401.
    pub async fn request(&self, request: ApiRequest) -> AuthResult<Value> {
        let inner = &self.inner;

        if is_auth_endpoint(&request.path) {
            let token = inner.store.access_token();
            return inner.transport.execute(&request, token.as_deref()).await;
        }

        let tenant = inner.resolver.resolve(&inner.location.current());
        let stamped = request.with_path(tenant.api_path(&request.path));
        let token = inner.store.access_token();
        let result = inner.transport.execute(&stamped, token.as_deref()).await;

        match result {
            Err(e) if e.is_unauthenticated() => {
                debug!(path = %stamped.path, tenant = ?tenant.slug(), "Unauthenticated, waiting for refresh");
                let transport = inner.transport.clone();
                inner
                    .refresh
                    .handle_unauthenticated(move |token| async move {
                        transport.execute(&stamped, Some(&token)).await
                    })
                    .await
            }
            other => other,
        }
    }

    pub async fn request_json<T: DeserializeOwned>(&self, request: ApiRequest) -> AuthResult<T> {
        let value = self.request(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Refresh the access token now, sharing any refresh already running.
    pub async fn refresh_now(&self) -> AuthResult<()> {
        self.inner.refresh.refresh_now().await
    }

    pub fn set_location(&self, path: impl Into<String>) {
        self.inner.location.set(path);
    }

    pub fn location(&self) -> String {
        self.inner.location.current()
    }

    /// Tenant for the current location.
    pub fn tenant(&self) -> TenantContext {
        self.inner.resolver.resolve(&self.inner.location.current())
    }

    /// Where an irrecoverable auth failure would send the user right now.
    pub fn login_path(&self) -> String {
        self.tenant()
            .login_path(self.inner.store.branding_hint().as_deref())
    }

    pub fn set_branding_hint(&self, hint: &str) -> AuthResult<()> {
        self.inner.store.set_branding_hint(hint)
    }

    pub fn session(&self) -> Option<Session<C>> {
        self.inner.store.load()
    }

    pub fn principal(&self) -> Option<Principal<C>> {
        self.session().map(|session| session.principal().clone())
    }

    /// Denied when nobody is signed in.
    pub fn has_capability(&self, flag: C::Flag) -> bool {
        self.principal()
            .is_some_and(|principal| principal.has_capability(flag))
    }

    pub fn is_global(&self) -> bool {
        self.principal()
            .is_some_and(|principal| principal.is_global())
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh.is_refreshing()
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.refresh.pending_len()
    }

    /// Stop background work without touching the persisted session.
    pub fn shutdown(&self) {
        self.inner.monitor.cancel();
        self.inner.refresh.reject_pending();
    }
}

impl<C: CapabilityModel> CoordinatorInner<C> {
    /// Transition the FSM and notify callback if state changed.
    fn transition(&self, input: &LoginMachineInput) -> AuthResult<AuthState> {
        let mut fsm = self.fsm.lock();
        let old_state = AuthState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input, old_state
            ))
        })?;

        let new_state = AuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                realm = %self.realm.name,
                old_state = ?old_state,
                new_state = ?new_state,
                "Auth state transition"
            );
            self.notify_state_change(new_state);
        }

        Ok(new_state)
    }

    /// Transition when the input still applies; otherwise leave the state.
    fn settle(&self, input: &LoginMachineInput) {
        if let Err(e) = self.transition(input) {
            debug!(error = %e, "Transition skipped");
        }
    }

    fn notify_state_change(&self, state: AuthState) {
        let callback = self.state_callback.lock();
        if let Some(callback) = callback.as_ref() {
            let principal = self
                .store
                .load()
                .filter(|_| state.is_authenticated())
                .map(|session| session.principal().clone());

            callback(AuthStateChangedPayload {
                state,
                principal_id: principal.as_ref().map(|p| p.id.clone()),
                username: principal.map(|p| p.username),
            });
        }
    }

    fn current_state(&self) -> AuthState {
        AuthState::from(self.fsm.lock().state())
    }

    fn pending_exchange(&self, expected: AuthState) -> AuthResult<ExchangeToken> {
        let state = self.current_state();
        if state != expected {
            return Err(AuthError::InvalidStateTransition(format!(
                "Expected {:?}, current state is {:?}",
                expected, state
            )));
        }
        self.exchange.lock().clone().ok_or_else(|| {
            AuthError::InvalidStateTransition("No login step in progress".to_string())
        })
    }

    fn apply_outcome(&self, outcome: LoginOutcome<C>) -> AuthResult<AuthState> {
        match outcome {
            LoginOutcome::Authenticated(grant) => self.establish(grant),
            LoginOutcome::TwoFactorRequired(exchange) => {
                let state = self.transition(&LoginMachineInput::TwoFactorRequired)?;
                *self.exchange.lock() = Some(exchange);
                info!(realm = %self.realm.name, "Two-factor verification required");
                Ok(state)
            }
            LoginOutcome::ResetRequired(exchange) => {
                let state = self.transition(&LoginMachineInput::ResetRequired)?;
                *self.exchange.lock() = Some(exchange);
                info!(realm = %self.realm.name, "Password change required");
                Ok(state)
            }
        }
    }

    /// Persist a grant and enter `Authenticated`.
    fn establish(&self, grant: Grant<C>) -> AuthResult<AuthState> {
        let session = Session::new(grant.token, grant.principal)?;

        self.store.save(&session)?;
        let state = match self.transition(&LoginMachineInput::Accepted) {
            Ok(state) => state,
            Err(e) => {
                // Logged out while the step was in flight.
                if let Err(clear_err) = self.store.clear() {
                    warn!(error = %clear_err, "Failed to clear stale session");
                }
                return Err(e);
            }
        };
        self.exchange.lock().take();
        self.monitor.schedule(session.expires_at());

        info!(
            realm = %self.realm.name,
            user_id = %session.principal().id,
            tenant = ?session.principal().tenant_id,
            expires_at = %session.expires_at(),
            "Login successful"
        );
        Ok(state)
    }

    /// Local validation failure on a 2FA or reset step.
    fn reject_step(&self, message: &str) -> AuthResult<AuthState> {
        self.settle(&LoginMachineInput::StepRejected);
        Err(AuthError::LoginRejected(message.to_string()))
    }

    /// Backend failure on a 2FA or reset step. Only rejections count as a
    /// step attempt; transport failures leave the machine untouched.
    fn step_failed(&self, err: AuthError) -> AuthError {
        if matches!(err, AuthError::LoginRejected(_)) {
            self.settle(&LoginMachineInput::StepRejected);
        }
        warn!(realm = %self.realm.name, error = %err, "Login step failed");
        err
    }

    fn on_session_event(&self, event: SessionEvent<C>) {
        match event {
            SessionEvent::Refreshed(session) => {
                self.monitor.schedule(session.expires_at());
                if self.current_state() == AuthState::Anonymous {
                    self.settle(&LoginMachineInput::Restore);
                }
            }
            SessionEvent::Expired { redirect } => {
                self.monitor.cancel();
                self.exchange.lock().take();
                self.settle(&LoginMachineInput::SessionExpired);
                info!(realm = %self.realm.name, redirect = %redirect, "Session expired");
            }
        }
    }
}
