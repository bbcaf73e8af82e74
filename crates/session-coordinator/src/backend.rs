//! Authentication backend port and its HTTP adapter.

use crate::capabilities::CapabilityModel;
use crate::session::Principal;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const LOGIN_PATH: &str = "/auth/login";
pub const VERIFY_TWO_FACTOR_PATH: &str = "/auth/verify-2fa";
pub const FORCE_CHANGE_SECRET_PATH: &str = "/auth/force-change-secret";
pub const REFRESH_TOKEN_PATH: &str = "/auth/refresh-token";
pub const LOGOUT_PATH: &str = "/auth/logout";

const AUTH_ENDPOINTS: [&str; 5] = [
    LOGIN_PATH,
    VERIFY_TWO_FACTOR_PATH,
    FORCE_CHANGE_SECRET_PATH,
    REFRESH_TOKEN_PATH,
    LOGOUT_PATH,
];

/// Whether `path` targets one of the authentication endpoints. Failures of
/// these requests must never be routed into the refresh coordinator.
pub fn is_auth_endpoint(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = path.trim_end_matches('/');
    AUTH_ENDPOINTS.iter().any(|endpoint| path.ends_with(endpoint))
}

/// Username and password for the first login step.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Short-lived token linking the steps of one login attempt. Held in memory
/// only; never written to the session store.
#[derive(Clone, PartialEq, Eq)]
pub struct ExchangeToken(String);

impl ExchangeToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ExchangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExchangeToken(<redacted>)")
    }
}

/// A fresh access token and the principal it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant<C> {
    pub token: String,
    pub principal: Principal<C>,
}

/// Result of a login or 2FA step.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome<C> {
    Authenticated(Grant<C>),
    TwoFactorRequired(ExchangeToken),
    ResetRequired(ExchangeToken),
}

/// Backend auth surface consumed by the coordinator.
#[async_trait]
pub trait AuthBackend<C: CapabilityModel>: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> AuthResult<LoginOutcome<C>>;

    async fn verify_two_factor(
        &self,
        exchange: &ExchangeToken,
        code: &str,
    ) -> AuthResult<LoginOutcome<C>>;

    async fn force_change_secret(
        &self,
        exchange: &ExchangeToken,
        new_secret: &str,
    ) -> AuthResult<Grant<C>>;

    /// Exchange the backend-held refresh cookie for a new grant.
    async fn refresh_token(&self) -> AuthResult<Grant<C>>;

    /// Best-effort server-side invalidation.
    async fn logout(&self, access_token: Option<&str>) -> AuthResult<()>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepResponse<C> {
    token: Option<String>,
    principal: Option<Principal<C>>,
    #[serde(default)]
    two_factor_required: bool,
    #[serde(default)]
    reset_required: bool,
    temp_token: Option<String>,
}

/// Interpret a login / verify-2fa response body.
pub fn outcome_from_value<C: CapabilityModel>(value: Value) -> AuthResult<LoginOutcome<C>> {
    let response: StepResponse<C> = serde_json::from_value(value)?;

    if response.two_factor_required || response.reset_required {
        let exchange = response
            .temp_token
            .filter(|token| !token.is_empty())
            .map(ExchangeToken::new)
            .ok_or_else(|| AuthError::UnexpectedResponse("step response without tempToken".into()))?;

        return Ok(if response.two_factor_required {
            LoginOutcome::TwoFactorRequired(exchange)
        } else {
            LoginOutcome::ResetRequired(exchange)
        });
    }

    match (response.token, response.principal) {
        (Some(token), Some(principal)) => Ok(LoginOutcome::Authenticated(Grant { token, principal })),
        _ => Err(AuthError::UnexpectedResponse(
            "success response without token and principal".into(),
        )),
    }
}

/// Interpret a refresh / force-change-secret response body.
pub fn grant_from_value<C: CapabilityModel>(value: Value) -> AuthResult<Grant<C>> {
    match outcome_from_value(value)? {
        LoginOutcome::Authenticated(grant) => Ok(grant),
        _ => Err(AuthError::UnexpectedResponse(
            "expected a session grant, got a further login step".into(),
        )),
    }
}

/// How a non-success status is reported for a given endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    /// Credential / code / secret submission: client errors are user-facing.
    Step,
    /// Everything else: 401 stays `Unauthenticated`.
    Session,
}

fn classify_status(status: StatusCode, message: String, endpoint: Endpoint) -> AuthError {
    let client_rejection = matches!(
        status,
        StatusCode::BAD_REQUEST
            | StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::UNPROCESSABLE_ENTITY
    );

    match endpoint {
        Endpoint::Step if client_rejection => AuthError::LoginRejected(message),
        _ if status == StatusCode::UNAUTHORIZED => AuthError::Unauthenticated,
        _ => AuthError::Status {
            status: status.as_u16(),
            message,
        },
    }
}

/// Pull a human-readable message out of an error body.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

/// reqwest-backed implementation. The client keeps a cookie jar so the
/// httpOnly refresh cookie set at login is replayed on refresh.
pub struct HttpAuthBackend<C> {
    client: Client,
    base_url: Url,
    _capabilities: PhantomData<fn() -> C>,
}

impl<C: CapabilityModel> HttpAuthBackend<C> {
    pub fn new(base_url: Url, timeout: Duration) -> AuthResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            _capabilities: PhantomData,
        }
    }

    async fn post(
        &self,
        path: &str,
        body: &Value,
        bearer: Option<&str>,
        endpoint: Endpoint,
    ) -> AuthResult<Value> {
        let url = self.base_url.join(path.trim_start_matches('/'))?;
        debug!(url = %url, "Auth request");

        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(status, &body);
            warn!(status = %status, path, "Auth request failed");
            return Err(classify_status(status, message, endpoint));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl<C: CapabilityModel> AuthBackend<C> for HttpAuthBackend<C> {
    async fn login(&self, credentials: &Credentials) -> AuthResult<LoginOutcome<C>> {
        let body = serde_json::to_value(credentials)?;
        let value = self.post(LOGIN_PATH, &body, None, Endpoint::Step).await?;
        outcome_from_value(value)
    }

    async fn verify_two_factor(
        &self,
        exchange: &ExchangeToken,
        code: &str,
    ) -> AuthResult<LoginOutcome<C>> {
        let body = serde_json::json!({ "tempToken": exchange.expose(), "code": code });
        let value = self
            .post(VERIFY_TWO_FACTOR_PATH, &body, None, Endpoint::Step)
            .await?;
        outcome_from_value(value)
    }

    async fn force_change_secret(
        &self,
        exchange: &ExchangeToken,
        new_secret: &str,
    ) -> AuthResult<Grant<C>> {
        let body = serde_json::json!({ "tempToken": exchange.expose(), "newSecret": new_secret });
        let value = self
            .post(FORCE_CHANGE_SECRET_PATH, &body, None, Endpoint::Step)
            .await?;
        grant_from_value(value)
    }

    async fn refresh_token(&self) -> AuthResult<Grant<C>> {
        let value = self
            .post(REFRESH_TOKEN_PATH, &serde_json::json!({}), None, Endpoint::Session)
            .await?;
        grant_from_value(value)
    }

    async fn logout(&self, access_token: Option<&str>) -> AuthResult<()> {
        self.post(LOGOUT_PATH, &serde_json::json!({}), access_token, Endpoint::Session)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::ManagerCapabilities;
    use serde_json::json;

    fn principal_json() -> Value {
        json!({
            "id": "user-1",
            "username": "jane",
            "displayName": "Jane Doe",
            "tenantId": "acme",
            "capabilities": { "membership": true }
        })
    }

    #[test]
    fn test_outcome_authenticated() {
        let outcome: LoginOutcome<ManagerCapabilities> =
            outcome_from_value(json!({ "token": "a.b.c", "principal": principal_json() })).unwrap();
        match outcome {
            LoginOutcome::Authenticated(grant) => {
                assert_eq!(grant.token, "a.b.c");
                assert_eq!(grant.principal.tenant_id.as_deref(), Some("acme"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_outcome_two_factor_and_reset() {
        let outcome: LoginOutcome<ManagerCapabilities> =
            outcome_from_value(json!({ "twoFactorRequired": true, "tempToken": "tmp-1" })).unwrap();
        assert_eq!(outcome, LoginOutcome::TwoFactorRequired(ExchangeToken::new("tmp-1")));

        let outcome: LoginOutcome<ManagerCapabilities> =
            outcome_from_value(json!({ "resetRequired": true, "tempToken": "tmp-2" })).unwrap();
        assert_eq!(outcome, LoginOutcome::ResetRequired(ExchangeToken::new("tmp-2")));
    }

    #[test]
    fn test_step_without_temp_token_is_unexpected() {
        let result: AuthResult<LoginOutcome<ManagerCapabilities>> =
            outcome_from_value(json!({ "twoFactorRequired": true }));
        assert!(matches!(result, Err(AuthError::UnexpectedResponse(_))));
    }

    #[test]
    fn test_grant_requires_principal() {
        let result: AuthResult<Grant<ManagerCapabilities>> =
            grant_from_value(json!({ "token": "a.b.c" }));
        assert!(matches!(result, Err(AuthError::UnexpectedResponse(_))));
    }

    #[test]
    fn test_classify_step_rejections() {
        let err = classify_status(StatusCode::UNAUTHORIZED, "Wrong code".into(), Endpoint::Step);
        assert_eq!(err, AuthError::LoginRejected("Wrong code".into()));

        let err = classify_status(StatusCode::UNAUTHORIZED, "expired".into(), Endpoint::Session);
        assert_eq!(err, AuthError::Unauthenticated);

        let err = classify_status(StatusCode::BAD_GATEWAY, "down".into(), Endpoint::Step);
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"message":"Invalid code"}"#),
            "Invalid code"
        );
        assert_eq!(
            error_message(StatusCode::FORBIDDEN, r#"{"error":"Locked"}"#),
            "Locked"
        );
        assert_eq!(error_message(StatusCode::FORBIDDEN, "<html>"), "HTTP 403");
    }

    #[test]
    fn test_auth_endpoint_detection() {
        assert!(is_auth_endpoint("/auth/login"));
        assert!(is_auth_endpoint("/auth/refresh-token?x=1"));
        assert!(is_auth_endpoint("/acme/auth/logout/"));
        assert!(!is_auth_endpoint("/members"));
        assert!(!is_auth_endpoint("/auth/profile"));
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let credentials = Credentials::new("jane", "hunter2");
        assert!(!format!("{:?}", credentials).contains("hunter2"));
        assert!(!format!("{:?}", ExchangeToken::new("tmp-secret")).contains("tmp-secret"));
    }
}
