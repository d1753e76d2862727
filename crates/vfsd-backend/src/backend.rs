//! Capability traits a backend implements.
//!
//! Verbs are grouped by capability. A backend that cannot do something keeps
//! the default body, which fails with [`VfsError::NotSupported`].

use crate::error::{Result, VfsError};
use crate::info::{AttributeMatcher, FileInfo, FsInfo};
use crate::job::{CopyFlags, JobContext, QueryInfoFlags, ReplaceOptions};
use crate::source::MountSource;
use crate::spec::MountSpec;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;

/// What a successful mount publishes to the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub spec: MountSpec,
    pub display_name: String,
    pub icon: String,
    pub symbolic_icon: String,
}

/// An attribute a caller may set through the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettableAttribute {
    pub name: String,
    pub kind: String,
}

/// Open stream returned by `open_for_read`.
#[async_trait]
pub trait ReadHandle: Send {
    /// Reads up to `count` bytes. An empty buffer means end of stream.
    async fn read(&mut self, job: &JobContext, count: usize) -> Result<Bytes>;

    async fn seek(&mut self, job: &JobContext, pos: SeekFrom) -> Result<u64>;

    async fn query_info(&mut self, job: &JobContext, attributes: &AttributeMatcher)
        -> Result<FileInfo>;

    async fn close(&mut self, job: &JobContext) -> Result<()>;
}

/// Open stream returned by `create`, `replace` and `append_to`.
#[async_trait]
pub trait WriteHandle: Send {
    /// Writes at the current position and returns the number of bytes taken.
    async fn write(&mut self, job: &JobContext, data: &[u8]) -> Result<usize>;

    async fn seek(&mut self, job: &JobContext, pos: SeekFrom) -> Result<u64>;

    async fn truncate(&mut self, job: &JobContext, size: u64) -> Result<()>;

    async fn query_info(&mut self, job: &JobContext, attributes: &AttributeMatcher)
        -> Result<FileInfo>;

    /// Flushes everything written so far to the backing store.
    async fn close(&mut self, job: &JobContext) -> Result<()>;
}

#[async_trait]
pub trait Mountable: Send + Sync {
    async fn mount(
        &self,
        job: &JobContext,
        spec: &MountSpec,
        source: Arc<dyn MountSource>,
        is_automount: bool,
    ) -> Result<MountInfo>;

    async fn unmount(&self, job: &JobContext) -> Result<()>;
}

#[async_trait]
pub trait QueryInfo: Send + Sync {
    async fn query_info(
        &self,
        job: &JobContext,
        path: &str,
        flags: QueryInfoFlags,
        attributes: &AttributeMatcher,
    ) -> Result<FileInfo>;

    async fn query_fs_info(
        &self,
        job: &JobContext,
        path: &str,
        attributes: &AttributeMatcher,
    ) -> Result<FsInfo>;

    async fn query_settable_attributes(
        &self,
        _job: &JobContext,
        _path: &str,
    ) -> Result<Vec<SettableAttribute>> {
        Ok(Vec::new())
    }

    async fn query_writable_namespaces(
        &self,
        _job: &JobContext,
        _path: &str,
    ) -> Result<Vec<SettableAttribute>> {
        Ok(Vec::new())
    }
}

#[async_trait]
pub trait Enumerate: Send + Sync {
    /// Lists the children of a directory in the order the backend saw them.
    async fn enumerate(
        &self,
        job: &JobContext,
        path: &str,
        flags: QueryInfoFlags,
        attributes: &AttributeMatcher,
    ) -> Result<Vec<FileInfo>>;
}

#[async_trait]
pub trait OpenRead: Send + Sync {
    async fn open_for_read(&self, job: &JobContext, path: &str) -> Result<Box<dyn ReadHandle>>;
}

#[async_trait]
pub trait OpenWrite: Send + Sync {
    async fn create(&self, job: &JobContext, path: &str) -> Result<Box<dyn WriteHandle>>;

    async fn replace(
        &self,
        job: &JobContext,
        path: &str,
        options: &ReplaceOptions,
    ) -> Result<Box<dyn WriteHandle>>;

    async fn append_to(&self, _job: &JobContext, _path: &str) -> Result<Box<dyn WriteHandle>> {
        Err(VfsError::NotSupported("Operation not supported".to_string()))
    }
}

#[async_trait]
pub trait Mutate: Send + Sync {
    async fn make_directory(&self, job: &JobContext, path: &str) -> Result<()>;

    async fn delete(&self, job: &JobContext, path: &str) -> Result<()>;

    /// Renames in place and returns the new path.
    async fn set_display_name(
        &self,
        job: &JobContext,
        path: &str,
        display_name: &str,
    ) -> Result<String>;

    async fn move_to(
        &self,
        job: &JobContext,
        source: &str,
        destination: &str,
        flags: CopyFlags,
    ) -> Result<()>;

    async fn copy(
        &self,
        job: &JobContext,
        source: &str,
        destination: &str,
        flags: CopyFlags,
    ) -> Result<()>;
}

#[async_trait]
pub trait Push: Send + Sync {
    /// Uploads a local file to `destination`.
    async fn push(
        &self,
        job: &JobContext,
        destination: &str,
        local_path: &Path,
        flags: CopyFlags,
        remove_source: bool,
    ) -> Result<()>;
}

/// Change notification. No shipped backend supports it yet.
#[async_trait]
pub trait Monitor: Send + Sync {
    async fn create_dir_monitor(&self, _job: &JobContext, _path: &str) -> Result<()> {
        Err(VfsError::NotSupported("Operation not supported".to_string()))
    }

    async fn create_file_monitor(&self, _job: &JobContext, _path: &str) -> Result<()> {
        Err(VfsError::NotSupported("Operation not supported".to_string()))
    }
}

/// Everything the daemon needs from a backend.
pub trait Backend:
    Mountable + QueryInfo + Enumerate + OpenRead + OpenWrite + Mutate + Push + Monitor
{
}

impl<T> Backend for T where
    T: Mountable + QueryInfo + Enumerate + OpenRead + OpenWrite + Mutate + Push + Monitor
{
}
