//! Request execution, response classification and the single retry.

use crate::api::decode_error_fields;
use crate::backend::{BodyStream, HttpRequest, HttpResponse, MultipartFile, RequestBody};
use crate::client::{lock, HOME_ENDPOINT};
use crate::{ApiError, AuthError, AuthResult, IcloudClient};
use bytes::Bytes;
use icloud_storage::SessionData;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, ORIGIN, REFERER, SET_COOKIE,
    USER_AGENT,
};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, trace, warn};
use url::Url;

/// Response headers copied into the session record.
const ACCOUNT_COUNTRY_HEADER: &str = "X-Apple-ID-Account-Country";
const SESSION_ID_HEADER: &str = "X-Apple-ID-Session-Id";
const SESSION_TOKEN_HEADER: &str = "X-Apple-Session-Token";
const TRUST_TOKEN_HEADER: &str = "X-Apple-TwoSV-Trust-Token";
const SCNT_HEADER: &str = "scnt";

/// Reason the session is missing the web auth cookie on an HSA account.
const MISSING_WEBAUTH_TOKEN: &str = "Missing X-APPLE-WEBAUTH-TOKEN cookie";

/// Request payload before serialization.
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    /// Sent unchanged.
    Raw(Bytes),
    Multipart(MultipartFile),
}

impl Body {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> AuthResult<Body> {
        Ok(Body::Json(serde_json::to_value(value)?))
    }
}

/// One logical call, possibly sent twice.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: Body,
    pub headers: Vec<(String, String)>,
    /// Hand back the live body instead of reading it.
    pub stream: bool,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            body: Body::Empty,
            headers: Vec::new(),
            stream: false,
        }
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Add headers; a later value for the same name wins.
    pub fn headers(mut self, headers: &[(&str, &str)]) -> Self {
        self.headers
            .extend(headers.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Successful response content.
#[derive(Debug)]
pub enum Payload {
    /// JSON body that carried no application error.
    Json(Vec<u8>),
    /// Body of any other content type.
    Raw(Vec<u8>),
    Stream(BodyStream),
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Json(_) => "json",
            Payload::Raw(_) => "raw",
            Payload::Stream(_) => "stream",
        }
    }
}

/// How many more attempts a logical call may make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryBudget {
    Available,
    Spent,
}

enum Outcome {
    Done(Payload),
    Retry,
}

type ReauthFuture<'a> = Pin<Box<dyn Future<Output = AuthResult<crate::AuthState>> + Send + 'a>>;

impl IcloudClient {
    /// Execute a logical call: at most two attempts.
    pub async fn execute(&self, request: ApiRequest) -> AuthResult<Payload> {
        let mut budget = RetryBudget::Available;
        let mut attempt = 1;

        loop {
            debug!(method = %request.method, url = %request.url, attempt, "Request");
            let response = self.send_once(&request).await?;

            match self.classify(&request, response, budget).await? {
                Outcome::Done(payload) => {
                    trace!(url = %request.url, kind = payload.kind(), "Request succeeded");
                    return Ok(payload);
                }
                Outcome::Retry => {
                    budget = RetryBudget::Spent;
                    attempt += 1;
                }
            }
        }
    }

    /// GET and decode a JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> AuthResult<T> {
        let payload = self.execute(ApiRequest::new(Method::GET, url)).await?;
        decode_json(url, payload)
    }

    /// POST and decode a JSON response.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: Body,
        headers: &[(&str, &str)],
    ) -> AuthResult<T> {
        let request = ApiRequest::new(Method::POST, url).body(body).headers(headers);
        let payload = self.execute(request).await?;
        decode_json(url, payload)
    }

    /// POST and ignore any response content.
    pub async fn post(&self, url: &str, body: Body, headers: &[(&str, &str)]) -> AuthResult<()> {
        self.post_payload(url, body, headers).await?;
        Ok(())
    }

    /// POST and return whatever content came back.
    pub async fn post_payload(
        &self,
        url: &str,
        body: Body,
        headers: &[(&str, &str)],
    ) -> AuthResult<Payload> {
        let request = ApiRequest::new(Method::POST, url).body(body).headers(headers);
        self.execute(request).await
    }

    /// GET and hand back the body unread.
    pub async fn get_stream(&self, url: &str) -> AuthResult<BodyStream> {
        match self
            .execute(ApiRequest::new(Method::GET, url).streaming())
            .await?
        {
            Payload::Stream(stream) => Ok(stream),
            Payload::Json(bytes) | Payload::Raw(bytes) => Ok(BodyStream::from_bytes(bytes)),
        }
    }

    async fn send_once(&self, request: &ApiRequest) -> AuthResult<HttpResponse> {
        let http_request = self.build_request(request)?;
        let url = http_request.url.clone();
        let response = self.backend.execute(http_request).await?;
        self.absorb_response(&url, &response.headers)?;
        Ok(response)
    }

    fn build_request(&self, request: &ApiRequest) -> AuthResult<HttpRequest> {
        let url = Url::parse(&request.url)?;
        let mut headers = HeaderMap::new();

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| AuthError::InvalidHeader(format!("{}: {}", name, e)))?;
            headers.insert(name, header_value(value)?);
        }
        headers.insert(ORIGIN, HeaderValue::from_static(HOME_ENDPOINT));
        headers.insert(REFERER, header_value(&format!("{}/", HOME_ENDPOINT))?);
        headers.insert(USER_AGENT, header_value(&self.user_agent)?);
        if let Some(cookie) = lock(&self.cookies).cookie_header(&url) {
            headers.insert(COOKIE, header_value(&cookie)?);
        }

        let body = match &request.body {
            Body::Empty => RequestBody::Empty,
            Body::Json(value) => RequestBody::Bytes(serde_json::to_vec(value)?.into()),
            Body::Raw(bytes) => RequestBody::Bytes(bytes.clone()),
            Body::Multipart(file) => RequestBody::Multipart(file.clone()),
        };

        Ok(HttpRequest {
            method: request.method.clone(),
            url,
            headers,
            body,
        })
    }

    /// Capture session headers and cookies, then persist both.
    fn absorb_response(&self, url: &Url, headers: &HeaderMap) -> AuthResult<()> {
        let session = {
            let mut guard = lock(&self.session);
            let session: &mut SessionData = &mut guard;
            let fields = [
                (ACCOUNT_COUNTRY_HEADER, &mut session.account_country),
                (SESSION_ID_HEADER, &mut session.session_id),
                (SESSION_TOKEN_HEADER, &mut session.session_token),
                (TRUST_TOKEN_HEADER, &mut session.trust_token),
                (SCNT_HEADER, &mut session.scnt),
            ];
            for (name, field) in fields {
                if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
                    if !value.is_empty() {
                        *field = value.to_string();
                    }
                }
            }
            session.clone()
        };

        let jar = {
            let mut jar = lock(&self.cookies);
            let set_cookies = headers
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok());
            jar.store_response_cookies(url, set_cookies);
            jar.clone()
        };

        self.storage.save_session(&session)?;
        self.storage.save_cookies(&jar)?;
        trace!("Saved session and cookies");
        Ok(())
    }

    async fn classify(
        &self,
        request: &ApiRequest,
        response: HttpResponse,
        budget: RetryBudget,
    ) -> AuthResult<Outcome> {
        let status = response.status;
        let code = status.as_u16();
        let is_json = is_json_content(&response.headers);
        let is_auth_error = matches!(code, 421 | 450 | 500);

        if request.stream && !status.is_client_error() && !status.is_server_error() {
            return Ok(Outcome::Done(Payload::Stream(response.body)));
        }

        let body = response.body.bytes().await?;
        trace!(code, is_json, is_auth_error, len = body.len(), "Response");

        if code >= 400 && (!is_json || is_auth_error) {
            let reason = status.canonical_reason().unwrap_or("");

            if budget == RetryBudget::Available && code == 450 && self.is_findme_url(&request.url) {
                debug!("Re-authenticating Find My iPhone service");
                if let Err(e) = self.reauthenticate("find").await {
                    debug!(error = %e, "Re-authentication failed");
                }
                return Ok(Outcome::Retry);
            }
            if budget == RetryBudget::Available && is_auth_error {
                debug!(code, reason, "Auth error, retrying");
                return Ok(Outcome::Retry);
            }
            return Err(self.translate_error(code as i64, reason, reason));
        }

        if request.stream {
            // Structured error body on a failed download.
            return Err(match decode_error_fields(&body) {
                Some((api_code, reason)) => self.translate_error(api_code, "", &reason),
                None => {
                    let reason = status.canonical_reason().unwrap_or("");
                    self.translate_error(code as i64, reason, reason)
                }
            });
        }

        if !is_json {
            return Ok(Outcome::Done(Payload::Raw(body)));
        }

        if let Some((api_code, reason)) = decode_error_fields(&body) {
            return Err(self.translate_error(api_code, "", &reason));
        }

        Ok(Outcome::Done(Payload::Json(body)))
    }

    fn is_findme_url(&self, url: &str) -> bool {
        self.account()
            .webservice_url("findme")
            .map(|findme| url.contains(findme))
            .unwrap_or(false)
    }

    /// Boxed so that authentication may be re-entered from inside a request.
    fn reauthenticate<'a>(&'a self, service: &'a str) -> ReauthFuture<'a> {
        Box::pin(self.authenticate(true, Some(service)))
    }

    /// Map a failed status or an application error to a typed error.
    pub(crate) fn translate_error(&self, code: i64, status: &str, reason: &str) -> AuthError {
        if self.requires_2sa() && reason == MISSING_WEBAUTH_TOKEN {
            return AuthError::SecondStepRequired;
        }

        let mut reason = reason.to_string();
        match status {
            "ZONE_NOT_FOUND" | "AUTHENTICATION_FAILED" => {
                return ApiError::new(
                    code,
                    status,
                    "Please log into https://icloud.com/ to manually finish setting up your iCloud service",
                )
                .into();
            }
            "ACCESS_DENIED" => {
                reason.push_str(".  Please wait a few minutes then try again");
                reason.push_str(". The remote servers might be trying to throttle requests.");
            }
            _ => {}
        }

        if matches!(code, 421 | 450 | 500) {
            reason = "Authentication required for Account.".to_string();
        }

        ApiError::new(code, status, reason).into()
    }
}

fn header_value(value: &str) -> AuthResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| AuthError::InvalidHeader(e.to_string()))
}

fn is_json_content(headers: &HeaderMap) -> bool {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let mime = content_type.split(';').next().unwrap_or("").trim();
    mime.eq_ignore_ascii_case("application/json") || mime.eq_ignore_ascii_case("text/json")
}

fn decode_json<T: DeserializeOwned>(url: &str, payload: Payload) -> AuthResult<T> {
    match payload {
        Payload::Json(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
            warn!(url = %url, error = %e, "Failed to parse JSON response");
            AuthError::Json(e)
        }),
        other => Err(AuthError::InvalidResponse(format!(
            "expected JSON from {}, got {} content",
            url,
            other.kind()
        ))),
    }
}
