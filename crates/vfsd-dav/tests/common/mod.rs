#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::SecretString;
use std::collections::VecDeque;
use std::sync::Arc;
use vfsd_backend::{
    AskPasswordFlags, JobContext, MemoryKeyring, MountSource, MountSpec, Mountable, PasswordReply,
    PasswordSave,
};
use vfsd_dav::transport::RequestBody;
use vfsd_dav::{
    CertificateErrors, CertificateOverrides, DavBackend, DavConfig, HttpRequest, HttpResponse,
    HttpTransport, Method, TransportError,
};

/// Canned answer of the scripted server.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// `200` answer to OPTIONS from a WebDAV server.
    pub fn dav_options() -> Self {
        Reply::new(200).header("DAV", "1, 2")
    }

    pub fn multistatus(xml: String) -> Self {
        Reply::new(207)
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(xml)
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Reply::new(status).header("Location", location)
    }

    fn into_response(self, request: &HttpRequest) -> HttpResponse {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            headers.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        HttpResponse::from_bytes(
            self.status,
            request.url.clone(),
            headers,
            Bytes::from(self.body),
        )
    }
}

/// What the scripted server saw.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub file_length: Option<u64>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

type Handler = dyn Fn(&HttpRequest) -> Reply + Send + Sync;

/// Transport answering from a closure and recording every request.
pub struct MockTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<Recorded>>,
    certificates: CertificateOverrides,
    untrusted: Mutex<Option<(String, Vec<u8>, CertificateErrors)>>,
}

impl MockTransport {
    pub fn new(handler: impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            certificates: CertificateOverrides::new(),
            untrusted: Mutex::new(None),
        })
    }

    /// Fails handshakes with `host` until the certificate is overridden.
    pub fn untrusted_certificate(&self, host: &str, certificate: &[u8], errors: CertificateErrors) {
        *self.untrusted.lock() = Some((host.to_string(), certificate.to_vec(), errors));
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }

    pub fn count(&self, method: Method) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    pub fn last(&self, method: Method) -> Option<Recorded> {
        self.requests
            .lock()
            .iter()
            .rev()
            .find(|r| r.method == method)
            .cloned()
    }

    pub fn clear(&self) {
        self.requests.lock().clear();
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let untrusted = self.untrusted.lock().clone();
        if let Some((host, certificate, errors)) = untrusted {
            if request.url.host_str() == Some(host.as_str())
                && !self.certificates.accepts(&host, &certificate, errors)
            {
                return Err(TransportError::Certificate {
                    host,
                    certificate,
                    errors,
                });
            }
        }

        let (body, file_length) = match &request.body {
            RequestBody::Empty => (None, None),
            RequestBody::Bytes(bytes) => (Some(bytes.clone()), None),
            RequestBody::File { length, .. } => (None, Some(*length)),
        };
        self.requests.lock().push(Recorded {
            method: request.method,
            path: request.url.path().to_string(),
            url: request.url.to_string(),
            headers: request.headers.clone(),
            body,
            file_length,
        });
        Ok((self.handler)(request).into_response(request))
    }

    fn certificates(&self) -> &CertificateOverrides {
        &self.certificates
    }
}

/// Mount source with scripted answers.
#[derive(Default)]
pub struct ScriptedSource {
    passwords: Mutex<VecDeque<PasswordReply>>,
    accept_certificate: bool,
    pub password_prompts: Mutex<Vec<(String, AskPasswordFlags)>>,
    pub certificate_prompts: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answers every password prompt with `user`/`password` until `times` run out.
    pub fn answering(user: &str, password: &str, times: usize) -> Arc<Self> {
        let source = Self::default();
        {
            let mut queue = source.passwords.lock();
            for _ in 0..times {
                queue.push_back(answer(user, password));
            }
        }
        Arc::new(source)
    }

    pub fn accepting_certificates() -> Arc<Self> {
        Arc::new(Self {
            accept_certificate: true,
            ..Self::default()
        })
    }

    pub fn prompt_count(&self) -> usize {
        self.password_prompts.lock().len()
    }
}

pub fn answer(user: &str, password: &str) -> PasswordReply {
    PasswordReply::Answered {
        username: Some(user.to_string()),
        password: SecretString::new(password.to_string()),
        save: PasswordSave::ForSession,
    }
}

#[async_trait]
impl MountSource for ScriptedSource {
    async fn ask_password(
        &self,
        message: &str,
        _default_user: Option<&str>,
        _default_domain: Option<&str>,
        flags: AskPasswordFlags,
    ) -> PasswordReply {
        self.password_prompts
            .lock()
            .push((message.to_string(), flags));
        self.passwords
            .lock()
            .pop_front()
            .unwrap_or(PasswordReply::Aborted)
    }

    async fn ask_certificate(&self, host: &str, _certificate: &[u8], errors: &[&str]) -> bool {
        self.certificate_prompts.lock().push((
            host.to_string(),
            errors.iter().map(|e| e.to_string()).collect(),
        ));
        self.accept_certificate
    }
}

/// One `<response>` element of a multistatus body.
pub struct Entry {
    href: String,
    collection: bool,
    length: Option<u64>,
    etag: Option<String>,
    extra: String,
}

impl Entry {
    pub fn dir(href: &str) -> Self {
        Self {
            href: href.to_string(),
            collection: true,
            length: None,
            etag: None,
            extra: String::new(),
        }
    }

    pub fn file(href: &str, length: u64) -> Self {
        Self {
            href: href.to_string(),
            collection: false,
            length: Some(length),
            etag: None,
            extra: String::new(),
        }
    }

    pub fn etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }

    /// Raw XML appended inside `<D:prop>`.
    pub fn prop(mut self, xml: &str) -> Self {
        self.extra.push_str(xml);
        self
    }

    fn to_xml(&self) -> String {
        let mut prop = String::new();
        if self.collection {
            prop.push_str("<D:resourcetype><D:collection/></D:resourcetype>");
        } else {
            prop.push_str("<D:resourcetype/>");
        }
        if let Some(length) = self.length {
            prop.push_str(&format!("<D:getcontentlength>{}</D:getcontentlength>", length));
        }
        if let Some(etag) = &self.etag {
            prop.push_str(&format!("<D:getetag>{}</D:getetag>", etag));
        }
        prop.push_str(&self.extra);
        format!(
            "<D:response><D:href>{}</D:href><D:propstat><D:prop>{}</D:prop>\
             <D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>",
            self.href, prop
        )
    }
}

pub fn multistatus(entries: &[Entry]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?><D:multistatus xmlns:D="DAV:">"#);
    for entry in entries {
        xml.push_str(&entry.to_xml());
    }
    xml.push_str("</D:multistatus>");
    xml
}

pub fn header<'a>(request: &'a HttpRequest, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}

pub fn dav_spec(host: &str, prefix: &str) -> MountSpec {
    MountSpec::new("dav")
        .with("host", host)
        .with("ssl", "true")
        .with_prefix(prefix)
}

pub fn backend(transport: Arc<MockTransport>) -> DavBackend {
    DavBackend::new(
        transport,
        Arc::new(MemoryKeyring::new()),
        &DavConfig::default(),
    )
}

/// Serves OPTIONS and collection PROPFINDs for every path under `root`.
pub fn share_root(request: &HttpRequest, root: &str) -> Option<Reply> {
    let path = request.url.path();
    if !path.starts_with(root) {
        return None;
    }
    match request.method {
        Method::Options => Some(Reply::dav_options()),
        Method::Propfind if path.ends_with('/') && header(request, "Depth") == Some("1") => {
            Some(Reply::multistatus(multistatus(&[Entry::dir(path)])))
        }
        _ => None,
    }
}

/// Backend mounted at `https://dav.example.test/`, answering everything else with `handler`.
pub async fn mounted(
    handler: impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static,
) -> (DavBackend, Arc<MockTransport>, JobContext) {
    let transport = MockTransport::new(move |request| {
        let discovery = request.method == Method::Options
            || (request.method == Method::Propfind
                && request.url.path() == "/"
                && header(request, "Depth") == Some("1"));
        if discovery {
            return share_root(request, "/").unwrap_or_else(|| handler(request));
        }
        handler(request)
    });
    let backend = backend(transport.clone());
    let job = JobContext::new();
    backend
        .mount(&job, &dav_spec("dav.example.test", "/"), ScriptedSource::new(), false)
        .await
        .unwrap();
    transport.clear();
    (backend, transport, job)
}
