//! Sign-in, second-step/second-factor verification and session trust.
//!
//! Every `authenticate` call starts the FSM from `Unauthenticated` and walks
//! one of three paths into `Evaluating`, where the account snapshot decides
//! whether a challenge is pending. Challenges are queried, not thrown.

use crate::api::{DeviceList, SuccessResponse};
use crate::auth_fsm::{AuthMachineInput, AuthState};
use crate::client::{lock, AUTH_ENDPOINT, HOME_ENDPOINT, SETUP_ENDPOINT};
use crate::error::{CODE_NOT_FOUND, CODE_WRONG_SECURITY_CODE, CODE_WRONG_VERIFICATION};
use crate::transport::Body;
use crate::{AccountState, AuthError, AuthResult, Device, IcloudClient};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

/// Public OAuth client key of the iCloud web app.
const WIDGET_KEY: &str = "d39ba9916b7251055b22c7f910e2ea796ee65e98b2ddecea8f5dde8d9d1a815d";

/// Serializable summary of the client's authentication state.
#[derive(Debug, Clone, Serialize)]
pub struct AuthStatus {
    pub state: AuthState,
    pub account_name: String,
    pub trusted: bool,
    pub requires_2sa: bool,
    pub requires_2fa: bool,
    pub services: Vec<String>,
}

impl IcloudClient {
    /// Establish an authenticated session.
    ///
    /// A stored session token is tried first unless `force_refresh` is set.
    /// When `service` names an app that can launch with one factor, a
    /// service-scoped login is attempted before the full credential path.
    /// The returned state tells whether a verification code is still needed.
    pub async fn authenticate(
        &self,
        force_refresh: bool,
        service: Option<&str>,
    ) -> AuthResult<AuthState> {
        self.reset_machine();

        let has_token = lock(&self.session).has_session_token();
        if has_token && !force_refresh {
            self.transition(&AuthMachineInput::TokenFound)?;
            match self.validate_token().await {
                Ok(account) => {
                    self.replace_account(account);
                    self.transition(&AuthMachineInput::TokenAccepted)?;
                    return self.settle();
                }
                Err(e) => {
                    debug!(error = %e, "Invalid authentication token, will log in from scratch");
                    self.transition(&AuthMachineInput::TokenRejected)?;
                }
            }
        }

        if let Some(service) = service {
            if self.account().allows_one_factor(service) {
                self.transition(&AuthMachineInput::ServiceAllowsOneFactor)?;
                match self.authenticate_with_credentials_service(service).await {
                    Ok(()) => {
                        self.transition(&AuthMachineInput::ServiceLoginSucceeded)?;
                        return self.settle();
                    }
                    Err(e) => {
                        debug!(service, error = %e, "Could not log into service, attempting full login");
                        self.transition(&AuthMachineInput::ServiceLoginFailed)?;
                    }
                }
            }
        }

        debug!(account = %self.account_name, "Authenticating with credentials");
        self.transition(&AuthMachineInput::SubmitCredentials)?;
        let trust_tokens = lock(&self.session).trust_tokens();
        let body = Body::json(&json!({
            "accountName": self.account_name,
            "password": self.password,
            "rememberMe": true,
            "trustTokens": trust_tokens,
        }))?;
        let headers = self.auth_headers(true);
        let signin = format!("{}/signin?isRememberMeEnabled=true", AUTH_ENDPOINT);
        if let Err(e) = self.post(&signin, body, &as_pairs(&headers)).await {
            debug!(error = %e, "Sign-in rejected");
            self.transition(&AuthMachineInput::LoginFailed)?;
            return Err(AuthError::LoginFailed);
        }
        self.transition(&AuthMachineInput::CredentialsAccepted)?;

        if let Err(e) = self.authenticate_with_token().await {
            self.transition(&AuthMachineInput::LoginFailed)?;
            return Err(e);
        }
        self.transition(&AuthMachineInput::AccountLoaded)?;

        self.settle()
    }

    /// Decide the challenge from the current snapshot.
    fn settle(&self) -> AuthResult<AuthState> {
        let account = self.account();
        let input = if account.requires_2fa() {
            AuthMachineInput::SecondFactorChallenge
        } else if account.requires_2sa() {
            AuthMachineInput::SecondStepChallenge
        } else {
            AuthMachineInput::NoChallenge
        };
        let state = self.transition(&input)?;
        info!(account = %self.account_name, state = %state, "Authentication settled");
        Ok(state)
    }

    async fn validate_token(&self) -> AuthResult<AccountState> {
        debug!("Checking session token validity");
        self.post_json(&format!("{}/validate", SETUP_ENDPOINT), Body::Empty, &[])
            .await
    }

    /// Exchange the session token for a fresh account snapshot.
    pub async fn authenticate_with_token(&self) -> AuthResult<()> {
        let body = {
            let session = lock(&self.session);
            json!({
                "accountCountryCode": session.account_country,
                "dsWebAuthToken": session.session_token,
                "extended_login": true,
                "trustToken": session.trust_token,
            })
        };

        let account: AccountState = self
            .post_json(
                &format!("{}/accountLogin", SETUP_ENDPOINT),
                Body::Json(body),
                &[],
            )
            .await
            .map_err(|e| {
                debug!(error = %e, "Account login rejected");
                AuthError::LoginFailed
            })?;

        self.replace_account(account);
        Ok(())
    }

    async fn authenticate_with_credentials_service(&self, service: &str) -> AuthResult<()> {
        let body = Body::json(&json!({
            "appName": service,
            "apple_id": self.account_name,
            "password": self.password,
        }))?;

        self.post(&format!("{}/accountLogin", SETUP_ENDPOINT), body, &[])
            .await
            .map_err(|e| {
                debug!(service, error = %e, "Service login rejected");
                AuthError::LoginFailed
            })?;

        let account = self.validate_token().await?;
        self.replace_account(account);
        Ok(())
    }

    fn auth_headers(&self, use_session: bool) -> Vec<(String, String)> {
        let client_id = self.client_id();
        let mut headers: Vec<(String, String)> = [
            ("Accept", "*/*"),
            ("Content-Type", "application/json"),
            ("X-Apple-OAuth-Client-Id", WIDGET_KEY),
            ("X-Apple-OAuth-Client-Type", "firstPartyAuth"),
            ("X-Apple-OAuth-Redirect-URI", HOME_ENDPOINT),
            ("X-Apple-OAuth-Require-Grant-Code", "true"),
            ("X-Apple-OAuth-Response-Mode", "web_message"),
            ("X-Apple-OAuth-Response-Type", "code"),
            ("X-Apple-OAuth-State", client_id.as_str()),
            ("X-Apple-Widget-Key", WIDGET_KEY),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        if use_session {
            let session = lock(&self.session);
            if !session.scnt.is_empty() {
                headers.push(("scnt".to_string(), session.scnt.clone()));
            }
            if !session.session_id.is_empty() {
                headers.push(("X-Apple-ID-Session-Id".to_string(), session.session_id.clone()));
            }
        }

        headers
    }

    pub fn requires_2fa(&self) -> bool {
        self.account().requires_2fa()
    }

    pub fn requires_2sa(&self) -> bool {
        self.account().requires_2sa()
    }

    pub fn is_trusted_session(&self) -> bool {
        self.account().is_trusted_session()
    }

    /// Devices that can receive a second-step code.
    pub async fn trusted_devices(&self) -> AuthResult<Vec<Device>> {
        let list: DeviceList = self
            .get_json(&format!("{}/listDevices", SETUP_ENDPOINT))
            .await?;
        if list.devices.is_empty() {
            return Err(AuthError::NoDevices);
        }
        debug!(count = list.devices.len(), "Listed trusted devices");
        Ok(list.devices)
    }

    pub async fn send_verification_code(&self, device: &Device) -> AuthResult<()> {
        let response: SuccessResponse = self
            .post_json(
                &format!("{}/sendVerificationCode", SETUP_ENDPOINT),
                Body::json(device)?,
                &[],
            )
            .await?;
        if !response.success {
            return Err(AuthError::VerificationNotSent);
        }
        info!(device_type = %device.device_type, "Verification code sent");
        Ok(())
    }

    /// Submit a second-step code, then trust the session.
    ///
    /// If trusting fails because the account has no trusted devices left,
    /// authentication is restarted from scratch and its outcome returned.
    pub async fn validate_verification_code(&self, device: &Device, code: &str) -> AuthResult<()> {
        let mut body = serde_json::to_value(device)?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("verificationCode".to_string(), json!(code));
            obj.insert("trustBrowser".to_string(), json!(true));
        }

        let result = self
            .post(
                &format!("{}/validateVerificationCode", SETUP_ENDPOINT),
                Body::Json(body),
                &[],
            )
            .await;
        match result {
            Err(e) if e.api_code() == Some(CODE_WRONG_VERIFICATION) => {
                self.try_transition(&AuthMachineInput::CodeRejected);
                return Err(AuthError::WrongVerification);
            }
            Err(e) => return Err(e),
            Ok(()) => {
                self.try_transition(&AuthMachineInput::CodeAccepted);
            }
        }

        if let Err(e) = self.trust_session().await {
            if e.api_code() == Some(CODE_NOT_FOUND) {
                info!("Account lacks trusted devices, authenticating from scratch");
                return self.authenticate(false, None).await.map(|_| ());
            }
            return Err(e);
        }

        if self.requires_2sa() {
            return Err(AuthError::LoginFailed);
        }
        Ok(())
    }

    /// Submit a second-factor security code.
    pub async fn validate_2fa_code(&self, code: &str) -> AuthResult<()> {
        let body = Body::json(&json!({ "securityCode": { "code": code } }))?;
        let mut headers = self.auth_headers(true);
        headers.push(("Accept".to_string(), "application/json".to_string()));

        let url = format!("{}/verify/trusteddevice/securitycode", AUTH_ENDPOINT);
        match self.post(&url, body, &as_pairs(&headers)).await {
            Err(e) if e.api_code() == Some(CODE_WRONG_SECURITY_CODE) => {
                self.try_transition(&AuthMachineInput::CodeRejected);
                Err(AuthError::WrongVerification)
            }
            Err(e) => Err(e),
            Ok(()) => {
                debug!("Security code accepted");
                self.try_transition(&AuthMachineInput::CodeAccepted);
                Ok(())
            }
        }
    }

    /// Ask the service to trust this session, then reload the account.
    pub async fn trust_session(&self) -> AuthResult<()> {
        let headers = self.auth_headers(true);
        let result = async {
            self.post(
                &format!("{}/2sv/trust", AUTH_ENDPOINT),
                Body::Empty,
                &as_pairs(&headers),
            )
            .await?;
            self.authenticate_with_token().await
        }
        .await;

        match result {
            Ok(()) => {
                if self.try_transition(&AuthMachineInput::TrustGranted).is_some() {
                    if let Err(e) = self.settle() {
                        debug!(error = %e, "Could not settle auth state after trust");
                    }
                }
                Ok(())
            }
            Err(e) => {
                let input = if e.api_code() == Some(CODE_NOT_FOUND) {
                    AuthMachineInput::TrustUnavailable
                } else {
                    AuthMachineInput::TrustFailed
                };
                self.try_transition(&input);
                Err(e)
            }
        }
    }

    /// Validate a security code and trust the session if it is not already.
    pub async fn complete_second_factor(&self, code: &str) -> AuthResult<()> {
        self.validate_2fa_code(code).await?;

        if self.is_trusted_session() {
            self.try_transition(&AuthMachineInput::TrustSkipped);
            return Ok(());
        }

        if let Err(e) = self.trust_session().await {
            warn!(error = %e, "Failed to request trust. You will likely be prompted for the code again");
            return Err(e);
        }
        Ok(())
    }

    pub fn status(&self) -> AuthStatus {
        let account = self.account();
        AuthStatus {
            state: self.auth_state(),
            account_name: self.account_name.clone(),
            trusted: account.is_trusted_session(),
            requires_2sa: account.requires_2sa(),
            requires_2fa: account.requires_2fa(),
            services: account.service_names(),
        }
    }
}

fn as_pairs(headers: &[(String, String)]) -> Vec<(&str, &str)> {
    headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}
