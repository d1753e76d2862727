//! # vfsd-backend
//!
//! The contract between the vfsd daemon and its backends.
//!
//! This crate provides:
//! - Capability traits per verb group ([`QueryInfo`], [`Enumerate`], [`OpenRead`], ...)
//!   and the [`Backend`] supertrait the daemon dispatches through
//! - Stream handles for open files ([`ReadHandle`], [`WriteHandle`])
//! - File and filesystem metadata ([`FileInfo`], [`FsInfo`])
//! - Mount specifications ([`MountSpec`]) with IPv6 host helpers
//! - Prompt delivery ([`MountSource`]) and credential storage ([`Keyring`])
//! - The error taxonomy every verb completes with ([`VfsError`])
//!
//! ## Example
//!
//! ```ignore
//! use vfsd_backend::{AttributeMatcher, JobContext, MountSpec, QueryInfoFlags};
//!
//! let backend = registry.create(&spec)?;
//! let job = JobContext::new();
//! backend.mount(&job, &spec, source, false).await?;
//! let info = backend
//!     .query_info(&job, "/docs", QueryInfoFlags::default(), &AttributeMatcher::all())
//!     .await?;
//! println!("{} ({:?})", info.display_name, info.file_type);
//! ```

mod backend;
mod error;
mod info;
mod job;
mod keyring;
mod registry;
mod source;
mod spec;

pub use backend::{
    Backend, Enumerate, Monitor, MountInfo, Mountable, Mutate, OpenRead, OpenWrite, Push,
    QueryInfo, ReadHandle, SettableAttribute, WriteHandle,
};
pub use error::{BoxError, Result, VfsError};
pub use info::{AttributeMatcher, FileInfo, FileType, FsInfo};
pub use job::{CopyFlags, JobContext, ProgressCallback, QueryInfoFlags, ReplaceOptions};
pub use keyring::{Keyring, KeyringEntry, KeyringKey, MemoryKeyring, NoKeyring};
pub use registry::{BackendFactory, BackendRegistry};
pub use source::{AskPasswordFlags, MountSource, PasswordReply, PasswordSave};
pub use spec::{bracket_host, strip_brackets, MountSpec};
