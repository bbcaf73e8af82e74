//! Authentication session coordination for the Member Portal.
//!
//! This crate provides:
//! - Session persistence over a key-value store
//! - Tenant resolution from the navigation path
//! - Proactive token refresh ahead of expiry
//! - Single-flight refresh with FIFO replay of requests that hit a 401
//! - Explicit FSM-based login flow (credentials, 2FA, forced secret reset)
//! - Capability checks on the authenticated principal
//!
//! Everything is generic over the realm's [`CapabilityModel`]; the admin and
//! manager portals are two instantiations of [`SessionCoordinator`].

mod auth_fsm;
mod backend;
mod capabilities;
mod coordinator;
mod error;
mod expiry;
mod navigation;
mod refresh;
mod request;
mod session;
mod tenant;
mod token;

pub use auth_fsm::login_machine;
pub use auth_fsm::{
    AuthState, AuthStateChangedPayload, LoginMachine, LoginMachineInput, LoginMachineState,
};
pub use backend::{
    grant_from_value, is_auth_endpoint, outcome_from_value, AuthBackend, Credentials,
    ExchangeToken, Grant, HttpAuthBackend, LoginOutcome, FORCE_CHANGE_SECRET_PATH, LOGIN_PATH,
    LOGOUT_PATH, REFRESH_TOKEN_PATH, VERIFY_TWO_FACTOR_PATH,
};
pub use capabilities::{AdminRole, Capability, CapabilityModel, ManagerCapabilities};
pub use coordinator::{AuthStateCallback, RealmConfig, SessionCoordinator, DEFAULT_MANAGEMENT_KEYWORD};
pub use error::{AuthError, AuthResult};
pub use expiry::{
    ExpiryMonitor, ExpiryPolicy, RefreshPlan, RefreshTrigger, DEFAULT_REFRESH_IMMEDIATELY_WITHIN,
    DEFAULT_SAFETY_MARGIN,
};
pub use navigation::{Location, Navigator, TracingNavigator};
pub use refresh::{RefreshCoordinator, SessionCallback, SessionEvent};
pub use request::{ApiRequest, ApiTransport, HttpTransport};
pub use session::{Principal, Session, SessionStore};
pub use tenant::{resolve_slug, TenantContext, TenantResolver, BRANDING_QUERY_PARAM};
pub use token::{decode_claims, expires_at, TokenClaims};
