//! The iCloud client: session state, cookies, account snapshot and auth FSM.
//!
//! Transport lives in `transport.rs` and the login protocol in
//! `negotiator.rs`; both are `impl` blocks on [`IcloudClient`].

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthState};
use crate::backend::{HttpBackend, ReqwestBackend};
use crate::{AccountState, AuthError, AuthResult};
use icloud_config_and_utils::{Config, Paths};
use icloud_storage::{CookieJar, FileStorage, SessionData, SessionStorage};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use url::Url;

/// Authentication service base URL.
pub const AUTH_ENDPOINT: &str = "https://idmsa.apple.com/appleauth/auth";
/// Web origin every request claims to come from.
pub const HOME_ENDPOINT: &str = "https://www.icloud.com";
/// Web session setup service base URL.
pub const SETUP_ENDPOINT: &str = "https://setup.icloud.com/setup/ws/1";

/// Client for one Apple ID.
///
/// All state sits behind short-lived locks that are never held across an
/// await, so the client can be shared in an `Arc`. Calls are still expected
/// to be made one at a time per session.
pub struct IcloudClient {
    pub(crate) backend: Arc<dyn HttpBackend>,
    pub(crate) storage: Arc<dyn SessionStorage>,
    pub(crate) account_name: String,
    pub(crate) password: String,
    pub(crate) user_agent: String,
    pub(crate) session: Mutex<SessionData>,
    pub(crate) cookies: Mutex<CookieJar>,
    /// Replaced wholesale, never mutated in place.
    pub(crate) account: Mutex<Arc<AccountState>>,
    pub(crate) fsm: Mutex<AuthMachine>,
}

impl IcloudClient {
    /// Create a client, loading any stored session and cookies.
    pub fn new(
        account_name: &str,
        password: &str,
        backend: Arc<dyn HttpBackend>,
        storage: Arc<dyn SessionStorage>,
    ) -> AuthResult<Self> {
        let mut session = storage.load_session()?.unwrap_or_default();
        if session.ensure_client_id() {
            debug!(client_id = %session.client_id, "Generated new client id");
        }
        let cookies = storage.load_cookies()?;
        debug!(
            has_token = session.has_session_token(),
            cookies = cookies.len(),
            "Loaded stored session"
        );

        Ok(Self {
            backend,
            storage,
            account_name: account_name.to_string(),
            password: password.to_string(),
            user_agent: icloud_config_and_utils::DEFAULT_USER_AGENT.to_string(),
            session: Mutex::new(session),
            cookies: Mutex::new(cookies),
            account: Mutex::new(Arc::new(AccountState::default())),
            fsm: Mutex::new(AuthMachine::new()),
        })
    }

    /// Create a client that keeps its session under `<data_root>/<account_name>/`
    /// and talks to the network through reqwest.
    pub fn open(
        account_name: &str,
        password: &str,
        paths: &Paths,
        config: &Config,
    ) -> AuthResult<Self> {
        let dir = paths.ensure_account_dir(account_name)?;
        let storage = Arc::new(FileStorage::in_dir(&dir));
        let backend = Arc::new(ReqwestBackend::new(config.request_timeout())?);

        Ok(Self::new(account_name, password, backend, storage)?
            .with_user_agent(&config.user_agent))
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// Stable client identifier sent with mutations.
    pub fn client_id(&self) -> String {
        lock(&self.session).client_id.clone()
    }

    /// Copy of the current session record.
    pub fn session(&self) -> SessionData {
        lock(&self.session).clone()
    }

    /// Current account snapshot.
    pub fn account(&self) -> Arc<AccountState> {
        Arc::clone(&lock(&self.account))
    }

    pub(crate) fn replace_account(&self, state: AccountState) {
        *lock(&self.account) = Arc::new(state);
    }

    /// Base URL of a web service from the current snapshot.
    pub fn webservice_url(&self, service: &str) -> AuthResult<String> {
        self.account()
            .webservice_url(service)
            .map(str::to_string)
            .ok_or_else(|| AuthError::ServiceNotActive(service.to_string()))
    }

    /// Value of a cookie that would be sent to `url`.
    pub fn cookie_value(&self, url: &str, name: &str) -> AuthResult<Option<String>> {
        let url = Url::parse(url)?;
        Ok(lock(&self.cookies)
            .value_for(&url, name)
            .map(str::to_string))
    }

    /// Get the current FSM state.
    pub fn auth_state(&self) -> AuthState {
        AuthState::from(lock(&self.fsm).state())
    }

    pub(crate) fn reset_machine(&self) {
        *lock(&self.fsm) = AuthMachine::new();
    }

    /// Transition the FSM.
    pub(crate) fn transition(&self, input: &AuthMachineInput) -> AuthResult<AuthState> {
        let mut fsm = lock(&self.fsm);
        let old_state = AuthState::from(fsm.state());

        fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;

        let new_state = AuthState::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(
                old_state = ?old_state,
                new_state = ?new_state,
                "Auth state transition"
            );
        }

        Ok(new_state)
    }

    /// Transition the FSM where the step is advisory: a rejected input is
    /// logged and the state is left unchanged.
    pub(crate) fn try_transition(&self, input: &AuthMachineInput) -> Option<AuthState> {
        match self.transition(input) {
            Ok(state) => Some(state),
            Err(e) => {
                debug!(error = %e, "Ignoring auth state transition");
                None
            }
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
