//! Scripted HTTP backend for tests.
//!
//! Responses are served in the order they were pushed; every request is
//! recorded so tests can assert on URLs, headers and bodies.

use crate::backend::{BodyStream, ByteStream, HttpBackend, HttpRequest, HttpResponse, RequestBody};
use crate::client::lock;
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A canned response.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Fail the connection after the body has been delivered.
    pub interrupted: bool,
}

impl ScriptedResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: vec![(
                CONTENT_TYPE.to_string(),
                "application/json;charset=UTF-8".to_string(),
            )],
            body: body.to_string().into_bytes(),
            interrupted: false,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: vec![(CONTENT_TYPE.to_string(), "text/plain".to_string())],
            body: body.as_bytes().to_vec(),
            interrupted: false,
        }
    }

    /// Untyped body, as served by the content hosts.
    pub fn bytes(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![(
                CONTENT_TYPE.to_string(),
                "application/octet-stream".to_string(),
            )],
            body,
            interrupted: false,
        }
    }

    /// Deliver the body as one chunk, then fail the read.
    pub fn interrupted(mut self) -> Self {
        self.interrupted = true;
        self
    }

    /// Add a header. Repeating a name adds another value.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// A request as the backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body parsed as JSON; `Null` when absent or not JSON.
    pub fn json_body(&self) -> Value {
        match &self.body {
            RequestBody::Bytes(bytes) => serde_json::from_slice(bytes).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

/// Backend that replays queued responses.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: ScriptedResponse) {
        lock(&self.responses).push_back(response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Responses not yet served.
    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }
}

#[async_trait]
impl HttpBackend for ScriptedBackend {
    async fn execute(&self, request: HttpRequest) -> AuthResult<HttpResponse> {
        let url = request.url.to_string();
        lock(&self.requests).push(RecordedRequest {
            method: request.method,
            url: url.clone(),
            headers: request.headers,
            body: request.body,
        });

        let scripted = lock(&self.responses)
            .pop_front()
            .ok_or_else(|| AuthError::InvalidResponse(format!("no scripted response for {}", url)))?;

        let status = StatusCode::from_u16(scripted.status)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
        let mut headers = HeaderMap::new();
        for (name, value) in &scripted.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| AuthError::InvalidHeader(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| AuthError::InvalidHeader(e.to_string()))?;
            headers.append(name, value);
        }

        Ok(HttpResponse {
            status,
            headers,
            body: if scripted.interrupted {
                BodyStream::new(InterruptedStream(Some(scripted.body)))
            } else {
                BodyStream::from_bytes(scripted.body)
            },
        })
    }
}

struct InterruptedStream(Option<Vec<u8>>);

#[async_trait]
impl ByteStream for InterruptedStream {
    async fn next_chunk(&mut self) -> AuthResult<Option<Vec<u8>>> {
        match self.0.take() {
            Some(chunk) => Ok(Some(chunk)),
            None => Err(AuthError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            ))),
        }
    }
}
