//! Drive error types.

use icloud_auth::AuthError;
use thiserror::Error;

/// Drive error type.
#[derive(Error, Debug)]
pub enum DriveError {
    /// No child with this name
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation needs a folder
    #[error("Not a folder: {0}")]
    NotDirectory(String),

    /// Operation needs a file
    #[error("Not a file: {0}")]
    NotFile(String),

    /// The web auth cookie carries no upload token
    #[error("cannot obtain upload token")]
    UploadToken,

    /// Source produced a different byte count than declared
    #[error("{name}: declared {declared} bytes, read {actual}")]
    SizeMismatch {
        name: String,
        declared: i64,
        actual: u64,
    },

    /// Response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Transport or authentication error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Local file error
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Token pattern failed to compile
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl DriveError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        DriveError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Returns true if retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DriveError::Auth(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias using DriveError.
pub type DriveResult<T> = Result<T, DriveError>;
