//! File-backed session storage.

use crate::{CookieJar, SessionData, SessionStorage, StorageResult};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores the session record as JSON and cookies as a Netscape cookie file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    session_path: PathBuf,
    cookies_path: PathBuf,
}

impl FileStorage {
    pub fn new(session_path: PathBuf, cookies_path: PathBuf) -> Self {
        Self {
            session_path,
            cookies_path,
        }
    }

    /// Use `session.txt` and `cookies.txt` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("session.txt"), dir.join("cookies.txt"))
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    pub fn cookies_path(&self) -> &Path {
        &self.cookies_path
    }
}

impl SessionStorage for FileStorage {
    fn load_session(&self) -> StorageResult<Option<SessionData>> {
        let content = match std::fs::read_to_string(&self.session_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save_session(&self, session: &SessionData) -> StorageResult<()> {
        let content = serde_json::to_vec(session)?;
        write_private(&self.session_path, &content)?;
        debug!(path = %self.session_path.display(), "Session saved");
        Ok(())
    }

    fn load_cookies(&self) -> StorageResult<CookieJar> {
        match std::fs::read_to_string(&self.cookies_path) {
            Ok(content) => Ok(CookieJar::from_netscape(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CookieJar::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_cookies(&self, jar: &CookieJar) -> StorageResult<()> {
        write_private(&self.cookies_path, jar.to_netscape().as_bytes())?;
        debug!(path = %self.cookies_path.display(), cookies = jar.len(), "Cookies saved");
        Ok(())
    }
}

/// Write through a sibling temp file and rename, so readers never see a
/// half-written file. The result is readable only by the owner.
fn write_private(path: &Path, content: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use url::Url;

    #[test]
    fn test_missing_files_load_as_empty() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::in_dir(dir.path());

        assert!(storage.load_session().unwrap().is_none());
        assert!(storage.load_cookies().unwrap().is_empty());
    }

    #[test]
    fn test_session_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::in_dir(&dir.path().join("nested"));

        let mut session = SessionData::new();
        session.session_token = "token".to_string();
        storage.save_session(&session).unwrap();

        assert_eq!(storage.load_session().unwrap(), Some(session));
    }

    #[test]
    fn test_session_file_uses_wire_keys() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::in_dir(dir.path());

        storage.save_session(&SessionData::new()).unwrap();
        let raw = std::fs::read_to_string(storage.session_path()).unwrap();
        assert!(raw.contains("\"ClientID\":\"auth-"));
        assert!(raw.contains("\"SCnt\""));
    }

    #[test]
    fn test_cookie_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::in_dir(dir.path());
        let url = Url::parse("https://www.icloud.com/").unwrap();

        let mut jar = CookieJar::new();
        jar.store_response_cookies(&url, ["a=1; Domain=icloud.com", "b=2"]);
        storage.save_cookies(&jar).unwrap();

        assert_eq!(storage.load_cookies().unwrap(), jar);
    }

    #[test]
    fn test_corrupt_session_is_an_error() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::in_dir(dir.path());
        std::fs::write(storage.session_path(), "{not json").unwrap();

        assert!(storage.load_session().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let storage = FileStorage::in_dir(dir.path());
        storage.save_session(&SessionData::new()).unwrap();

        let mode = std::fs::metadata(storage.session_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
