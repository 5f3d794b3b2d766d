//! Authentication and transport for the iCloud web services.
//!
//! This crate provides:
//! - An HTTP backend seam with a reqwest implementation
//! - The transport loop: session header capture, cookie handling, persistence
//!   after every round trip, and a single classified retry
//! - The account snapshot returned by the setup service
//! - An explicit FSM driving sign-in, second-step/second-factor verification
//!   and session trust

mod api;
mod auth_fsm;
mod backend;
mod client;
mod error;
mod negotiator;
mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use api::{AccountState, AppCapabilities, Device, DsInfo, Webservice};
pub use auth_fsm::auth_machine;
pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState, AuthState};
pub use backend::{
    BodyStream, ByteStream, HttpBackend, HttpRequest, HttpResponse, MultipartFile, ReqwestBackend,
    RequestBody,
};
pub use client::{IcloudClient, AUTH_ENDPOINT, HOME_ENDPOINT, SETUP_ENDPOINT};
pub use error::{ApiError, AuthError, AuthResult};
pub use negotiator::AuthStatus;
pub use transport::{ApiRequest, Body, Payload};
