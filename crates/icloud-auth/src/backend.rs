//! HTTP backend seam.
//!
//! The transport talks to the network only through [`HttpBackend`], so the
//! whole auth and drive flow can run against a scripted backend in tests.

use crate::AuthResult;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// File part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartFile {
    pub field_name: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    /// Shared with every retry of the request, never copied.
    pub content: Bytes,
}

/// Request body as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    Multipart(MultipartFile),
}

/// One fully prepared HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

/// Source of response body chunks.
#[async_trait]
pub trait ByteStream: Send {
    /// Next chunk, or `None` at end of body.
    async fn next_chunk(&mut self) -> AuthResult<Option<Vec<u8>>>;
}

/// Response body, read incrementally or all at once.
pub struct BodyStream {
    inner: Box<dyn ByteStream>,
}

impl std::fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyStream").finish_non_exhaustive()
    }
}

struct BufferedStream(Option<Vec<u8>>);

#[async_trait]
impl ByteStream for BufferedStream {
    async fn next_chunk(&mut self) -> AuthResult<Option<Vec<u8>>> {
        Ok(self.0.take().filter(|chunk| !chunk.is_empty()))
    }
}

impl BodyStream {
    pub fn new(stream: impl ByteStream + 'static) -> Self {
        Self {
            inner: Box::new(stream),
        }
    }

    /// A body already held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(BufferedStream(Some(bytes)))
    }

    /// A body with no content.
    pub fn empty() -> Self {
        Self::new(BufferedStream(None))
    }

    pub async fn chunk(&mut self) -> AuthResult<Option<Vec<u8>>> {
        self.inner.next_chunk().await
    }

    /// Read the rest of the body into memory.
    pub async fn bytes(mut self) -> AuthResult<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

/// Status, headers and a not-yet-read body.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

/// Executes prepared requests.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> AuthResult<HttpResponse>;
}

/// Backend built on a shared reqwest client.
///
/// Cookies are handled by the transport, so the client's own cookie store
/// stays disabled.
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    /// `timeout` bounds connecting and each read, not a whole download.
    pub fn new(timeout: Duration) -> AuthResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

struct ReqwestStream(reqwest::Response);

#[async_trait]
impl ByteStream for ReqwestStream {
    async fn next_chunk(&mut self) -> AuthResult<Option<Vec<u8>>> {
        Ok(self.0.chunk().await?.map(|bytes| bytes.to_vec()))
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(&self, request: HttpRequest) -> AuthResult<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Multipart(file) => {
                let len = file.content.len() as u64;
                let mut part = reqwest::multipart::Part::stream_with_length(file.content, len)
                    .file_name(file.file_name);
                if let Some(mime) = file.mime_type.as_deref() {
                    part = part.mime_str(mime)?;
                }
                builder.multipart(reqwest::multipart::Form::new().part(file.field_name, part))
            }
        };

        let response = builder.send().await?;
        debug!(status = %response.status(), url = %response.url(), "HTTP response");

        Ok(HttpResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body: BodyStream::new(ReqwestStream(response)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_bytes_yields_one_chunk() {
        let mut body = BodyStream::from_bytes(b"hello".to_vec());
        assert_eq!(body.chunk().await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(body.chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_body() {
        assert!(BodyStream::empty().bytes().await.unwrap().is_empty());
        assert!(BodyStream::from_bytes(Vec::new()).bytes().await.unwrap().is_empty());
    }

    #[test]
    fn test_reqwest_backend_builds() {
        assert!(ReqwestBackend::new(Duration::from_secs(5)).is_ok());
    }
}
