//! Mount specs, URIs and root discovery.
//!
//! The path a user asks for is often not itself advertised as a WebDAV
//! collection. [`discover`] checks it and then walks towards `/`, ending on
//! the highest collection that still answers like one.

use crate::multistatus::{propfind_body, Depth, Multistatus, LS_PROPERTIES};
use crate::path::{decode_path, encode_path, parent_dir, uri_host};
use crate::session::DavSession;
use crate::transport::{
    CertificateOverride, HttpRequest, Method, RequestBody, TransportError, HEADER_DAV, HEADER_DEPTH,
};
use log::debug;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use url::Url;
use vfsd_backend::{
    bracket_host, strip_brackets, FileType, JobContext, MountSource, MountSpec, Result, VfsError,
};

pub const MOUNT_ICON: &str = "folder-remote";
pub const MOUNT_SYMBOLIC_ICON: &str = "folder-remote-symbolic";

const NOT_WEBDAV: &str = "Not a WebDAV enabled share";

/// Builds the mount base URI from a `dav`/`davs` mount spec.
pub fn uri_from_spec(spec: &MountSpec) -> Result<Url> {
    match spec.mount_type() {
        Some("dav") | Some("davs") => {}
        Some(kind @ ("dav+sd" | "davs+sd")) => {
            return Err(VfsError::NotSupported(format!(
                "Mount type {} needs service discovery",
                kind
            )))
        }
        _ => return Err(VfsError::InvalidArgument("Invalid mount spec".to_string())),
    }

    let host = match spec.get("host") {
        Some(host) if !host.is_empty() => strip_brackets(host),
        _ => return Err(VfsError::InvalidArgument("Invalid mount spec".to_string())),
    };
    let ssl = spec.get("ssl") == Some("true") || spec.mount_type() == Some("davs");
    let scheme = if ssl { "https" } else { "http" };
    let host = if host.contains(':') {
        bracket_host(host)
    } else {
        host.to_string()
    };

    let mut uri = Url::parse(&format!("{}://{}/", scheme, host))
        .map_err(|_| VfsError::InvalidArgument("Invalid mount spec".to_string()))?;
    if let Some(user) = spec.get("user").filter(|u| !u.is_empty()) {
        uri.set_username(user)
            .map_err(|_| VfsError::InvalidArgument("Invalid mount spec".to_string()))?;
    }
    let port = spec
        .get("port")
        .and_then(|p| p.trim().parse::<u16>().ok())
        .filter(|p| *p != 0);
    if let Some(port) = port {
        uri.set_port(Some(port))
            .map_err(|_| VfsError::InvalidArgument("Invalid mount spec".to_string()))?;
    }
    let prefix = spec.prefix();
    let prefix = if prefix.is_empty() { "/" } else { prefix };
    uri.set_path(&encode_path(prefix));
    Ok(uri)
}

/// Mount spec published for a confirmed mount base.
pub fn spec_from_uri(uri: &Url) -> MountSpec {
    let mut spec = MountSpec::new("dav").with("host", bracket_host(&uri_host(uri)));
    spec.set("ssl", if uri.scheme() == "https" { "true" } else { "false" });
    if !uri.username().is_empty() {
        spec.set("user", uri.username());
    }
    if let Some(port) = uri.port() {
        spec.set("port", port.to_string());
    }
    let prefix = decode_path(uri.path()).unwrap_or_else(|| uri.path().to_string());
    spec.with_prefix(&prefix)
}

/// `"{user} on {host}[:port]"`, or just the host part without a user.
pub fn display_name(uri: &Url) -> String {
    let mut host = uri_host(uri);
    if let Some(port) = uri.port() {
        host.push_str(&format!(":{}", port));
    }
    if uri.username().is_empty() {
        host
    } else {
        format!("{} on {}", uri.username(), host)
    }
}

fn with_path(base: &Url, path: &str) -> Url {
    let mut uri = base.clone();
    uri.set_path(path);
    uri
}

enum CollectionCheck {
    Collection(bool),
    Failed(VfsError),
}

async fn check_collection(session: &DavSession, job: &JobContext, uri: Url) -> CollectionCheck {
    let request = HttpRequest::new(Method::Propfind, uri)
        .header(HEADER_DEPTH, HeaderValue::from_static(Depth::One.as_header()))
        .header(CONTENT_TYPE, HeaderValue::from_static("application/xml"))
        .body(RequestBody::Bytes(propfind_body(LS_PROPERTIES)));
    let response = match session.send(job, request).await {
        Ok(response) => response,
        Err(err) => return CollectionCheck::Failed(err.into()),
    };
    let (status, reason, url) = (response.status, response.reason.clone(), response.url.clone());
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(err) => return CollectionCheck::Failed(err.into()),
    };
    match Multistatus::from_status_and_body(status, &reason, &url, &body) {
        Ok(ms) => match ms.target() {
            Some(target) => CollectionCheck::Collection(target.file_type() == FileType::Directory),
            None => CollectionCheck::Collection(false),
        },
        Err(err) => CollectionCheck::Failed(err),
    }
}

/// Outcome of a successful [`discover`].
#[derive(Debug, Clone)]
pub struct Discovered {
    /// Base URI rewritten to the confirmed collection path.
    pub root: Url,
    /// Host whose certificate override this mount holds.
    pub certificate_host: Option<String>,
}

/// Finds the mount root starting at `base`.
///
/// A certificate override accepted on the way is held for the mount and
/// released again when discovery fails.
pub async fn discover(
    session: &DavSession,
    job: &JobContext,
    base: &Url,
    source: &dyn MountSource,
) -> Result<Discovered> {
    let mut held = None;
    match climb(session, job, base, source, &mut held).await {
        Ok(root) => Ok(Discovered {
            root,
            certificate_host: held,
        }),
        Err(err) => {
            if let Some(host) = held {
                session.transport().certificates().release(&host);
            }
            Err(err)
        }
    }
}

async fn climb(
    session: &DavSession,
    job: &JobContext,
    base: &Url,
    source: &dyn MountSource,
    held: &mut Option<String>,
) -> Result<Url> {
    let mut path = base.path().to_string();
    let mut last_good: Option<String> = None;
    let mut certificate_asked = false;
    let mut first_request = true;

    // Another mount's acceptance does not count for this one.
    let host = uri_host(base);
    if base.scheme() == "https" {
        if let Some(existing) = session.transport().certificates().accepted(&host) {
            certificate_asked = true;
            let descriptions = existing.errors.descriptions();
            if !source
                .ask_certificate(&host, &existing.certificate, &descriptions)
                .await
            {
                return Err(VfsError::AuthenticationCancelled);
            }
            session.transport().certificates().install(&host, existing);
            *held = Some(host);
        }
    }

    loop {
        let uri = with_path(base, &path);
        debug!("mount: probing {}", path);

        let response = match session.send(job, HttpRequest::new(Method::Options, uri)).await {
            Ok(response) => response,
            Err(TransportError::Certificate {
                host,
                certificate,
                errors,
            }) if !certificate_asked => {
                certificate_asked = true;
                let descriptions = errors.descriptions();
                if source.ask_certificate(&host, &certificate, &descriptions).await {
                    session.transport().certificates().install(
                        &host,
                        CertificateOverride {
                            certificate,
                            errors,
                        },
                    );
                    *held = Some(host);
                    continue;
                }
                return Err(VfsError::AuthenticationCancelled);
            }
            Err(err) => return Err(err.into()),
        };

        let mut response = response;
        let status = response.status;
        let is_success = response.is_success();
        let is_webdav = response.headers.contains_key(HEADER_DAV);
        let reason = response.reason.clone();
        let confirmed_url = response.url.clone();
        response.skip().await?;

        if status == 403 && first_request && session.auth().has_credentials() {
            debug!("mount: 403 on first request, retrying without cached passwords");
            first_request = false;
            session.auth().reset();
            continue;
        }
        first_request = false;

        if !is_success || !is_webdav {
            if let Some(good) = last_good {
                return Ok(with_path(base, &good));
            }
            if (is_success && !is_webdav) || status == 405 {
                return Err(VfsError::Failed(NOT_WEBDAV.to_string()));
            }
            return Err(VfsError::from_status(status, &reason));
        }

        // Redirects of the check (trailing slash) move the candidate.
        path = confirmed_url.path().to_string();
        let is_collection = match check_collection(session, job, with_path(base, &path)).await {
            CollectionCheck::Collection(is_collection) => is_collection,
            CollectionCheck::Failed(err) => {
                if let Some(good) = last_good {
                    return Ok(with_path(base, &good));
                }
                return Err(err);
            }
        };
        debug!("mount: {} webdav, collection {}", path, is_collection);

        if is_collection {
            last_good = Some(path.clone());
            session.auth().set_from_data();
            if path == "/" {
                return Ok(with_path(base, &path));
            }
        } else if let Some(good) = last_good {
            return Ok(with_path(base, &good));
        } else if path == "/" {
            return Err(VfsError::Failed(NOT_WEBDAV.to_string()));
        }
        path = parent_dir(&path);
    }
}
