//! Authentication and transport error types.

use std::fmt;
use thiserror::Error;

/// Code returned when a second-step verification code is wrong.
pub const CODE_WRONG_VERIFICATION: i64 = 21669;
/// Code returned when a second-factor security code is wrong.
pub const CODE_WRONG_SECURITY_CODE: i64 = -21669;
/// Code returned when the account has nothing to trust the session with.
pub const CODE_NOT_FOUND: i64 = 404;

/// Error reported by the service, carrying its code, status token and reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: i64,
    pub status: String,
    pub reason: String,
    pub retry: bool,
}

impl ApiError {
    pub fn new(code: i64, status: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code,
            status: status.into(),
            reason: reason.into(),
            retry: false,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut msg = self.reason.clone();
        if !self.status.is_empty() {
            if msg.is_empty() {
                msg = self.status.clone();
            } else {
                if !msg.ends_with('.') {
                    msg.push('.');
                }
                msg.push(' ');
                msg.push_str(&self.status);
            }
        }
        if self.code != 0 {
            msg = format!("{} ({})", msg, self.code);
        }
        if self.retry {
            msg.push_str(". Retrying ...");
        }
        f.write_str(&msg)
    }
}

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Credentials or the follow-up account login were rejected
    #[error("iCloud login failed")]
    LoginFailed,

    /// The session needs second-step verification before this call can succeed
    #[error("Two-step authentication required for account")]
    SecondStepRequired,

    /// The account has no trusted devices to send a code to
    #[error("No trusted devices available")]
    NoDevices,

    /// The verification or security code was not accepted
    #[error("Wrong verification code")]
    WrongVerification,

    /// The service did not confirm that a code was sent
    #[error("Failed to send verification code")]
    VerificationNotSent,

    /// The account snapshot has no URL for the named service
    #[error("iCloud service not activated: {0}")]
    ServiceNotActive(String),

    /// Error reported by the service
    #[error("{0}")]
    Api(ApiError),

    /// Response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// A header name or value could not be encoded
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Session or cookie persistence failed
    #[error("Storage error: {0}")]
    Storage(#[from] icloud_storage::StorageError),

    /// Configuration or path setup failed
    #[error("Configuration error: {0}")]
    Config(#[from] icloud_config_and_utils::CoreError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Connection failures and timeouts
    /// - Service errors flagged as retryable
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Http(e) => e.is_connect() || e.is_timeout(),
            AuthError::Api(e) => e.retry,
            _ => false,
        }
    }

    /// Numeric code of a service error, if this is one.
    pub fn api_code(&self) -> Option<i64> {
        match self {
            AuthError::Api(e) => Some(e.code),
            _ => None,
        }
    }
}

impl From<ApiError> for AuthError {
    fn from(e: ApiError) -> Self {
        AuthError::Api(e)
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
