//! Authentication error types.

use thiserror::Error;

/// Error kind returned by every session operation and by the request layer.
///
/// The HTTP layer classifies responses into these variants once; callers
/// match on the variant instead of inspecting status codes. The type is
/// `Clone` so a single refresh failure can be handed to every queued request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No response was received (connection refused, timeout, broken body).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The access token was missing, expired or rejected.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Bad credentials, 2FA code or new secret. Shown to the user as-is.
    #[error("{0}")]
    LoginRejected(String),

    /// The session could not be refreshed and has been cleared.
    #[error("Your session has expired. Please sign in again.")]
    SessionExpired,

    /// No session is held (or it was logged out while the request waited).
    #[error("Not logged in")]
    NotLoggedIn,

    /// Any other non-success HTTP response.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Token without a parseable expiry claim.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Invalid state transition in the login FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// The backend answered with a body we cannot interpret.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true for failures that should go through the refresh coordinator.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, AuthError::Unauthenticated)
    }

    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Transport(_) => true,
            AuthError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true for validation failures meant for display next to a form.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, AuthError::LoginRejected(_) | AuthError::SessionExpired)
    }
}

impl From<portal_storage::StorageError> for AuthError {
    fn from(err: portal_storage::StorageError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::UnexpectedResponse(err.to_string())
    }
}

impl From<url::ParseError> for AuthError {
    fn from(err: url::ParseError) -> Self {
        AuthError::Config(format!("Invalid URL: {}", err))
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status == reqwest::StatusCode::UNAUTHORIZED => {
                AuthError::Unauthenticated
            }
            Some(status) => AuthError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_decode() => AuthError::UnexpectedResponse(err.to_string()),
            None => AuthError::Transport(err.to_string()),
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
