use super::tls::{client_config, CertificateOverrides};
use super::{canonical_reason, HttpRequest, HttpResponse, HttpTransport, RequestBody, TransportError};
use crate::config::DavConfig;
use crate::path::{uri_host, without_userinfo};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use log::debug;
use reqwest::header::{HeaderValue, CONTENT_LENGTH};
use std::sync::{Arc, OnceLock};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use vfsd_backend::ProgressCallback;

const UPLOAD_CHUNK: usize = 64 * 1024;

static SHARED: OnceLock<Arc<ReqwestTransport>> = OnceLock::new();

/// [`HttpTransport`] over a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    certificates: CertificateOverrides,
}

impl ReqwestTransport {
    pub fn new(config: &DavConfig) -> Result<Self, TransportError> {
        let certificates = CertificateOverrides::new();
        let tls = client_config(certificates.clone()).map_err(TransportError::Tls)?;
        let client = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(config.pool_size)
            .pool_idle_timeout(config.pool_idle_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        Ok(Self {
            client,
            certificates,
        })
    }

    /// The process-wide transport. The first caller's config wins.
    pub fn shared(config: &DavConfig) -> Result<Arc<Self>, TransportError> {
        if let Some(existing) = SHARED.get() {
            return Ok(existing.clone());
        }
        let created = Arc::new(Self::new(config)?);
        let _ = SHARED.set(created.clone());
        Ok(SHARED.get().cloned().unwrap_or(created))
    }

    async fn file_body(
        &self,
        path: &std::path::Path,
        length: u64,
        progress: Option<ProgressCallback>,
    ) -> Result<reqwest::Body, TransportError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(TransportError::RequestBody)?;
        let mut sent = 0u64;
        let stream = ReaderStream::with_capacity(file.take(length), UPLOAD_CHUNK).inspect_ok(
            move |chunk| {
                sent += chunk.len() as u64;
                if let Some(progress) = &progress {
                    progress(sent, length);
                }
            },
        );
        Ok(reqwest::Body::wrap_stream(stream))
    }

    fn map_send_error(&self, url: &url::Url, err: reqwest::Error) -> TransportError {
        let host = uri_host(url);
        if let Some(rejected) = self.certificates.take_rejection(&host) {
            return TransportError::Certificate {
                host,
                certificate: rejected.certificate,
                errors: rejected.errors,
            };
        }
        if err.is_timeout() {
            return TransportError::Timeout(err.to_string());
        }
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        TransportError::Connect(message)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let wire_url = without_userinfo(&request.url);
        debug!("{} {}", request.method, wire_url);

        let mut builder = self
            .client
            .request(method, wire_url.clone())
            .headers(request.headers.clone());
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes.clone()),
            RequestBody::File {
                path,
                length,
                progress,
            } => builder
                .header(CONTENT_LENGTH, HeaderValue::from(*length))
                .body(self.file_body(path, *length, progress.clone()).await?),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_send_error(&wire_url, e))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map_err(|e| TransportError::Body(e.to_string()))
            .boxed();
        Ok(HttpResponse::new(
            status,
            canonical_reason(status),
            request.url.clone(),
            headers,
            body,
        ))
    }

    fn certificates(&self) -> &CertificateOverrides {
        &self.certificates
    }
}
