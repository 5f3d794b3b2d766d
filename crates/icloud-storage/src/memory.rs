//! In-memory session storage for tests and short-lived clients.

use crate::{CookieJar, SessionData, SessionStorage, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Keeps the session and cookie jar in memory. Can be told to fail writes.
#[derive(Default)]
pub struct MemoryStorage {
    session: Mutex<Option<SessionData>>,
    cookies: Mutex<CookieJar>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing session record.
    pub fn with_session(session: SessionData) -> Self {
        let storage = Self::default();
        *lock(&storage.session) = Some(session);
        storage
    }

    /// Make every subsequent save fail with an IO error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful session saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Current stored session record.
    pub fn session(&self) -> Option<SessionData> {
        lock(&self.session).clone()
    }

    /// Current stored cookie jar.
    pub fn cookies(&self) -> CookieJar {
        lock(&self.cookies).clone()
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "storage is read-only",
            )));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl SessionStorage for MemoryStorage {
    fn load_session(&self) -> StorageResult<Option<SessionData>> {
        Ok(lock(&self.session).clone())
    }

    fn save_session(&self, session: &SessionData) -> StorageResult<()> {
        self.check_writable()?;
        *lock(&self.session) = Some(session.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_cookies(&self) -> StorageResult<CookieJar> {
        Ok(lock(&self.cookies).clone())
    }

    fn save_cookies(&self, jar: &CookieJar) -> StorageResult<()> {
        self.check_writable()?;
        *lock(&self.cookies) = jar.clone();
        Ok(())
    }
}
