//! Storage trait definitions.

use crate::{CookieJar, SessionData, StorageResult};

/// Where session credentials and cookies survive between runs.
///
/// Implementations are called after every round trip, so they should be
/// cheap and must not leave partially written state behind on failure.
pub trait SessionStorage: Send + Sync {
    /// Load the session record. `None` means no prior session.
    fn load_session(&self) -> StorageResult<Option<SessionData>>;

    /// Persist the session record.
    fn save_session(&self, session: &SessionData) -> StorageResult<()>;

    /// Load the cookie jar. A missing jar loads as empty.
    fn load_cookies(&self) -> StorageResult<CookieJar>;

    /// Persist the cookie jar.
    fn save_cookies(&self, jar: &CookieJar) -> StorageResult<()>;
}
