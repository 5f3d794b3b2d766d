//! Authentication state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//!                      ┌─────────────────┐
//!        ┌─────────────│ Unauthenticated │ (initial)
//!        │             └───┬─────────┬───┘
//!        │ TokenFound      │         │ SubmitCredentials
//!        ▼                 │         ▼
//! ┌─────────────────┐      │  ┌─────────────────┐  CredentialsAccepted  ┌──────────────┐
//! │ ValidatingToken │      │  │ CredentialLogin │ ────────────────────► │ AccountLogin │
//! └────────┬────────┘      │  └─────────────────┘                       └──────┬───────┘
//!          │ TokenAccepted │ ServiceAllowsOneFactor                           │ AccountLoaded
//!          │               ▼                                                  │
//!          │        ┌──────────────┐  ServiceLoginSucceeded                   │
//!          │        │ ServiceLogin │ ─────────────────────┐                   │
//!          │        └──────────────┘                      ▼                   │
//!          │                                       ┌────────────┐             │
//!          └─────────────────────────────────────► │ Evaluating │ ◄───────────┘
//!                                                  └─────┬──────┘
//!          ┌──────────────────────────┬──────────────────┼────────────────────────┐
//!          │ SecondStepChallenge      │ SecondFactorChallenge                     │ NoChallenge
//!          ▼                          ▼                                           ▼
//! ┌────────────────────┐   ┌──────────────────────┐                      ┌───────────────┐
//! │ SecondStepRequired │   │ SecondFactorRequired │                      │ Authenticated │
//! └─────────┬──────────┘   └──────────┬───────────┘                      └───────────────┘
//!           │ CodeAccepted            │ CodeAccepted
//!           ▼                         ▼
//!         ┌──────────────────────────────┐  TrustGranted ──► Evaluating
//!         │           Trusting           │  TrustSkipped ──► Authenticated
//!         └──────────────────────────────┘  TrustUnavailable/TrustFailed ──► Unauthenticated
//! ```
//!
//! Failed token validation, service login and credential login all fall back
//! to `Unauthenticated`; a rejected code keeps the challenge state.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(Unauthenticated)

    Unauthenticated => {
        TokenFound => ValidatingToken,
        ServiceAllowsOneFactor => ServiceLogin,
        SubmitCredentials => CredentialLogin
    },
    ValidatingToken => {
        TokenAccepted => Evaluating,
        TokenRejected => Unauthenticated
    },
    ServiceLogin => {
        ServiceLoginSucceeded => Evaluating,
        ServiceLoginFailed => Unauthenticated
    },
    CredentialLogin => {
        CredentialsAccepted => AccountLogin,
        LoginFailed => Unauthenticated
    },
    AccountLogin => {
        AccountLoaded => Evaluating,
        LoginFailed => Unauthenticated
    },
    Evaluating => {
        NoChallenge => Authenticated,
        SecondStepChallenge => SecondStepRequired,
        SecondFactorChallenge => SecondFactorRequired
    },
    SecondStepRequired => {
        CodeRejected => SecondStepRequired,
        CodeAccepted => Trusting
    },
    SecondFactorRequired => {
        CodeRejected => SecondFactorRequired,
        CodeAccepted => Trusting
    },
    Trusting => {
        TrustGranted => Evaluating,
        TrustSkipped => Authenticated,
        TrustUnavailable => Unauthenticated,
        TrustFailed => Unauthenticated
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// Serializable view of the FSM state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    ValidatingToken,
    ServiceLogin,
    CredentialLogin,
    AccountLogin,
    Evaluating,
    SecondStepRequired,
    SecondFactorRequired,
    Trusting,
    Authenticated,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }

    /// The caller has to supply a verification code to continue.
    pub fn needs_code(&self) -> bool {
        matches!(
            self,
            AuthState::SecondStepRequired | AuthState::SecondFactorRequired
        )
    }
}

impl From<&AuthMachineState> for AuthState {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::Unauthenticated => AuthState::Unauthenticated,
            AuthMachineState::ValidatingToken => AuthState::ValidatingToken,
            AuthMachineState::ServiceLogin => AuthState::ServiceLogin,
            AuthMachineState::CredentialLogin => AuthState::CredentialLogin,
            AuthMachineState::AccountLogin => AuthState::AccountLogin,
            AuthMachineState::Evaluating => AuthState::Evaluating,
            AuthMachineState::SecondStepRequired => AuthState::SecondStepRequired,
            AuthMachineState::SecondFactorRequired => AuthState::SecondFactorRequired,
            AuthMachineState::Trusting => AuthState::Trusting,
            AuthMachineState::Authenticated => AuthState::Authenticated,
        }
    }
}

impl std::fmt::Display for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::ValidatingToken => "validating token",
            AuthState::ServiceLogin => "service login",
            AuthState::CredentialLogin => "credential login",
            AuthState::AccountLogin => "account login",
            AuthState::Evaluating => "evaluating",
            AuthState::SecondStepRequired => "second-step verification required",
            AuthState::SecondFactorRequired => "second-factor verification required",
            AuthState::Trusting => "requesting trust",
            AuthState::Authenticated => "authenticated",
        };
        f.write_str(s)
    }
}
