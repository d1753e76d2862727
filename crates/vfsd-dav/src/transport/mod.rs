//! HTTP transport.
//!
//! [`HttpTransport`] sends exactly one request and never follows redirects
//! or answers auth challenges itself; the session layer above does that so
//! it can inspect every hop. The production implementation is
//! [`ReqwestTransport`]; tests substitute a scripted one.

mod client;
pub mod redirect;
pub mod tls;

pub use client::ReqwestTransport;
pub use tls::{CertificateErrors, CertificateOverride, CertificateOverrides};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;
use vfsd_backend::{ProgressCallback, VfsError};

pub const HEADER_DEPTH: HeaderName = HeaderName::from_static("depth");
pub const HEADER_DESTINATION: HeaderName = HeaderName::from_static("destination");
pub const HEADER_OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
pub const HEADER_APPLY_TO_REDIRECT_REF: HeaderName =
    HeaderName::from_static("apply-to-redirect-ref");
pub const HEADER_DAV: HeaderName = HeaderName::from_static("dav");

/// Failures below the HTTP status level.
#[derive(Debug, Error)]
pub enum TransportError {
    /// DNS, connect, send or receive failure.
    #[error("connection error: {0}")]
    Connect(String),

    /// The connect timeout elapsed.
    #[error("connection timed out: {0}")]
    Timeout(String),

    /// The TLS layer rejected the server certificate.
    #[error("certificate for {host} rejected: {}", .errors.descriptions().join(", "))]
    Certificate {
        host: String,
        certificate: Vec<u8>,
        errors: CertificateErrors,
    },

    /// The TLS client could not be set up.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// The redirect ceiling was reached.
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(usize),

    /// A redirect pointed back at a URI/method pair already visited.
    #[error("redirect loop at {0}")]
    RedirectLoop(String),

    /// A `Location` header could not be resolved to an http(s) URI.
    #[error("invalid redirect location {0:?}")]
    InvalidRedirect(String),

    /// The request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Reading or draining a response body failed.
    #[error("failed to read response body: {0}")]
    Body(String),

    /// The local file backing a request body could not be read.
    #[error("failed to read request body: {0}")]
    RequestBody(#[source] std::io::Error),

    /// The user declined a credential prompt.
    #[error("authentication cancelled")]
    AuthenticationCancelled,

    /// The job's cancellation token fired.
    #[error("operation was cancelled")]
    Cancelled,
}

impl From<TransportError> for VfsError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => VfsError::Cancelled,
            TransportError::AuthenticationCancelled => VfsError::AuthenticationCancelled,
            other => VfsError::Transport(Box::new(other)),
        }
    }
}

/// HTTP and WebDAV methods the backend issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Put,
    Delete,
    Options,
    Propfind,
    Mkcol,
    Move,
    Copy,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Propfind => "PROPFIND",
            Method::Mkcol => "MKCOL",
            Method::Move => "MOVE",
            Method::Copy => "COPY",
        }
    }

    /// Methods that may be re-sent to a new location without changing meaning.
    pub fn is_safe(self) -> bool {
        matches!(
            self,
            Method::Get | Method::Head | Method::Options | Method::Propfind
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body, kept so it can be attached again on every resend.
#[derive(Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
    /// Streamed from a local file; reopened for each send.
    File {
        path: PathBuf,
        length: u64,
        progress: Option<ProgressCallback>,
    },
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            RequestBody::File { path, length, .. } => {
                write!(f, "File({}, {} bytes)", path.display(), length)
            }
        }
    }
}

/// One outbound exchange, mutated in place on redirect and auth retries.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
    /// Set once a redirect has been applied to this request.
    pub redirected: bool,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            redirected: false,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn header_str(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Body of a response as a stream of chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// A response with its body not yet read.
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    /// URI the response belongs to, after any redirects.
    pub url: Url,
    pub headers: HeaderMap,
    body: Option<BodyStream>,
}

impl HttpResponse {
    pub fn new(status: u16, reason: &str, url: Url, headers: HeaderMap, body: BodyStream) -> Self {
        Self {
            status,
            reason: reason.to_string(),
            url,
            headers,
            body: Some(body),
        }
    }

    /// Response with a fully buffered body and the canonical reason phrase.
    pub fn from_bytes(status: u16, url: Url, headers: HeaderMap, body: Bytes) -> Self {
        let reason = canonical_reason(status);
        let body = if body.is_empty() {
            stream::empty().boxed()
        } else {
            stream::once(async move { Ok(body) }).boxed()
        };
        Self::new(status, reason, url, headers, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirection(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Next body chunk, `None` at the end.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.body.as_mut() {
            Some(body) => body.next().await.transpose(),
            None => Ok(None),
        }
    }

    /// Reads the whole body into memory.
    pub async fn bytes(mut self) -> Result<Bytes, TransportError> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    /// Reads and discards the rest of the body.
    pub async fn skip(&mut self) -> Result<(), TransportError> {
        while self.chunk().await?.is_some() {}
        self.body = None;
        Ok(())
    }

    /// Maps the status onto an error kind.
    pub fn error(&self) -> VfsError {
        VfsError::from_status(self.status, &self.reason)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("url", &self.url.as_str())
            .finish()
    }
}

pub fn canonical_reason(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

/// Sends single HTTP requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Certificate overrides consulted during TLS handshakes.
    fn certificates(&self) -> &CertificateOverrides;
}
