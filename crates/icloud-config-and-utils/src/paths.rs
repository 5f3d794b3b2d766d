//! File system paths for configuration and per-account session data.

use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// Directory name used under the platform config dir and the temp dir.
const APP_DIR_NAME: &str = "icloud";
/// Cookie jar filename inside an account directory.
const COOKIES_FILE_NAME: &str = "cookies.txt";
/// Session record filename inside an account directory.
const SESSION_FILE_NAME: &str = "session.txt";

/// Resolves where configuration and account state live on disk.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Directory holding config.json (~/.config/icloud on Linux)
    config_dir: PathBuf,
    /// Root under which each account gets its own directory
    data_root: PathBuf,
}

impl Paths {
    /// Create a new Paths instance.
    ///
    /// Configuration lives under the platform config directory, account data
    /// under `<tmp>/icloud`.
    pub fn new() -> CoreResult<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CoreError::Path("Could not determine config directory".to_string()))?
            .join(APP_DIR_NAME);

        Ok(Self {
            config_dir,
            data_root: std::env::temp_dir().join(APP_DIR_NAME),
        })
    }

    /// Create a new Paths instance with everything under one base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            config_dir: base_dir.clone(),
            data_root: base_dir,
        }
    }

    /// Replace the data root, keeping the config directory.
    pub fn with_data_root(mut self, data_root: PathBuf) -> Self {
        self.data_root = data_root;
        self
    }

    /// Get the config directory.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get the config file path (<config_dir>/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    /// Get the data root.
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Get the directory holding one account's session and cookies.
    pub fn account_dir(&self, apple_id: &str) -> PathBuf {
        self.data_root.join(apple_id)
    }

    /// Get the cookie jar path for an account.
    pub fn cookies_file(&self, apple_id: &str) -> PathBuf {
        self.account_dir(apple_id).join(COOKIES_FILE_NAME)
    }

    /// Get the session record path for an account.
    pub fn session_file(&self, apple_id: &str) -> PathBuf {
        self.account_dir(apple_id).join(SESSION_FILE_NAME)
    }

    /// Ensure the config directory exists.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        Ok(())
    }

    /// Ensure an account directory exists, readable only by the owner.
    pub fn ensure_account_dir(&self, apple_id: &str) -> CoreResult<PathBuf> {
        if apple_id.is_empty() || apple_id.contains(['/', '\\']) {
            return Err(CoreError::Path(format!(
                "Invalid account name for a directory: {:?}",
                apple_id
            )));
        }

        let dir = self.account_dir(apple_id);
        std::fs::create_dir_all(&dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(dir)
    }
}
