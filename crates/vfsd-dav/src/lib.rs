//! # vfsd-dav
//!
//! WebDAV backend for vfsd.
//!
//! This crate provides:
//! - [`DavBackend`], implementing every [`vfsd_backend::Backend`] verb over
//!   HTTP and WebDAV (`PROPFIND`, `MKCOL`, `MOVE`, `COPY`)
//! - Mount root discovery that climbs from the requested path to the
//!   highest WebDAV collection
//! - Redirect handling that never resends unsafe methods elsewhere
//! - Basic authentication with keyring lookup and a bounded prompt policy
//! - TLS certificate overrides the user accepted once per mount
//! - A streaming multistatus (207) parser
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vfsd_backend::{AttributeMatcher, BackendRegistry, JobContext, MemoryKeyring, MountSpec};
//! use vfsd_dav::{DavConfig, ReqwestTransport};
//!
//! let config = DavConfig::default();
//! let transport = ReqwestTransport::shared(&config)?;
//! let mut registry = BackendRegistry::new();
//! vfsd_dav::register(&mut registry, transport, Arc::new(MemoryKeyring::new()), config);
//!
//! let spec = MountSpec::new("dav")
//!     .with("host", "dav.example.test")
//!     .with("ssl", "true")
//!     .with_prefix("/remote.php/dav/files/alice/");
//! let backend = registry.create(&spec)?;
//! let job = JobContext::new();
//! let mounted = backend.mount(&job, &spec, source, false).await?;
//! println!("mounted {}", mounted.display_name);
//!
//! for entry in backend
//!     .enumerate(&job, "/", Default::default(), &AttributeMatcher::all())
//!     .await?
//! {
//!     println!("{}", entry.display_name);
//! }
//! ```

pub mod auth;
mod backend;
pub mod config;
pub mod mime;
pub mod mount;
pub mod multistatus;
pub mod path;
pub mod session;
mod stream;
pub mod transport;

pub use backend::{register, DavBackend};
pub use config::{ConfigError, DavConfig};
pub use stream::{DavReadStream, DavWriteStream};
pub use transport::{
    CertificateErrors, CertificateOverride, CertificateOverrides, HttpRequest, HttpResponse,
    HttpTransport, Method, ReqwestTransport, TransportError,
};
