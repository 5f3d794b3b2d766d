//! Persistent session state for the iCloud client.
//!
//! This crate provides:
//! - The session record (client id, tokens, continuation token)
//! - A cookie jar keyed by domain and name, with Netscape file import/export
//! - The `SessionStorage` seam with file-backed and in-memory implementations

mod cookies;
mod file;
mod memory;
mod session;
mod traits;

pub use cookies::{Cookie, CookieJar};
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use session::SessionData;
pub use traits::SessionStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Stored data could not be decoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
