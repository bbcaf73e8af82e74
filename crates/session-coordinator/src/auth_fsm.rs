//! Login state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!                    Submit                 Accepted
//!   Anonymous ─────────────► Submitting ─────────────────────► Authenticated
//!     ▲  │                    │   │  │                           ▲   ▲   │
//!     │  │          Rejected  │   │  │ TwoFactorRequired         │   │   │
//!     │  │  ◄─────────────────┘   │  ▼                  Accepted │   │   │
//!     │  │                        │  TwoFactorPending ───────────┘   │   │
//!     │  │          ResetRequired │     │ ResetRequired              │   │
//!     │  │                        ▼     ▼                   Accepted │   │
//!     │  │                   ForcedSecretResetPending ───────────────┘   │
//!     │  │ Restore                                                       │
//!     │  └───────────────────────────────────────────────────────────────┘
//!     │                         SessionExpired                           │
//!     └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A rejected 2FA code or new secret (`StepRejected`) keeps the current step.
//! `Logout` returns every state to `Anonymous`.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub login_machine(Anonymous)

    Anonymous => {
        Submit => Submitting,
        // Stored session found at bootstrap
        Restore => Authenticated,
        Logout => Anonymous
    },
    Submitting => {
        Accepted => Authenticated,
        TwoFactorRequired => TwoFactorPending,
        ResetRequired => ForcedSecretResetPending,
        Rejected => Anonymous,
        Logout => Anonymous
    },
    TwoFactorPending => {
        Accepted => Authenticated,
        ResetRequired => ForcedSecretResetPending,
        // Wrong code: the user may try again
        StepRejected => TwoFactorPending,
        Logout => Anonymous
    },
    ForcedSecretResetPending => {
        Accepted => Authenticated,
        StepRejected => ForcedSecretResetPending,
        Logout => Anonymous
    },
    Authenticated => {
        // Refresh failed; store already cleared
        SessionExpired => Anonymous,
        Logout => Anonymous
    }
}

pub use login_machine::Input as LoginMachineInput;
pub use login_machine::State as LoginMachineState;
pub use login_machine::StateMachine as LoginMachine;

/// Authentication state as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Anonymous,
    /// Credentials sent, waiting for the backend.
    Submitting,
    /// Waiting for the user's second-factor code.
    TwoFactorPending,
    /// Waiting for the user to choose a new secret.
    ForcedSecretResetPending,
    Authenticated,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }

    /// Returns true while a backend call is outstanding.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthState::Submitting)
    }

    /// Returns true if the login flow is blocked on user input.
    pub fn awaits_user_step(&self) -> bool {
        matches!(
            self,
            AuthState::TwoFactorPending | AuthState::ForcedSecretResetPending
        )
    }
}

impl From<&LoginMachineState> for AuthState {
    fn from(state: &LoginMachineState) -> Self {
        match state {
            LoginMachineState::Anonymous => AuthState::Anonymous,
            LoginMachineState::Submitting => AuthState::Submitting,
            LoginMachineState::TwoFactorPending => AuthState::TwoFactorPending,
            LoginMachineState::ForcedSecretResetPending => AuthState::ForcedSecretResetPending,
            LoginMachineState::Authenticated => AuthState::Authenticated,
        }
    }
}

/// Payload for auth state change notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    pub state: AuthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}
