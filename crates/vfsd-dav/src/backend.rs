//! The WebDAV backend: filesystem verbs mapped onto HTTP requests.

use crate::auth::AuthManager;
use crate::config::DavConfig;
use crate::mount::{self, MOUNT_ICON, MOUNT_SYMBOLIC_ICON};
use crate::multistatus::{
    propfind_body, Depth, Multistatus, LS_PROPERTIES, QUOTA_PROPERTIES, STAT_PROPERTIES,
};
use crate::path::{basename, build_path, parent_dir, uri_for_path, without_userinfo};
use crate::session::DavSession;
use crate::stream::{DavReadStream, DavWriteStream};
use crate::transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, HEADER_APPLY_TO_REDIRECT_REF,
    HEADER_DEPTH, HEADER_DESTINATION, HEADER_OVERWRITE,
};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, trace};
use parking_lot::{Mutex, RwLock};
use reqwest::header::{HeaderValue, CONTENT_TYPE, ETAG, IF_MATCH};
use std::path::Path;
use std::sync::Arc;
use url::Url;
use vfsd_backend::{
    AttributeMatcher, Backend, BackendRegistry, CopyFlags, Enumerate, FileInfo, FileType, FsInfo,
    JobContext, Keyring, Monitor, MountInfo, MountSource, MountSpec, Mountable, Mutate, OpenRead,
    OpenWrite, Push, QueryInfo, QueryInfoFlags, ReadHandle, ReplaceOptions, Result, VfsError,
    WriteHandle,
};

const FS_ATTRIBUTES: &[&str] = &["filesystem::size", "filesystem::free", "filesystem::used"];

/// Type and child count of a resource, from a minimal PROPFIND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stat {
    pub file_type: FileType,
    pub size: Option<u64>,
    pub children: usize,
}

impl Stat {
    fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// State shared by the backend and its open streams.
pub(crate) struct DavInner {
    session: DavSession,
    base: RwLock<Option<Url>>,
    /// Host whose certificate override this mount holds.
    certificate_host: Mutex<Option<String>>,
}

fn exists_error() -> VfsError {
    VfsError::Exists("Target file already exists".to_string())
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| VfsError::InvalidArgument(format!("Invalid header value {:?}", value)))
}

fn overwrite_header(overwrite: bool) -> HeaderValue {
    HeaderValue::from_static(if overwrite { "T" } else { "F" })
}

impl DavInner {
    pub(crate) fn base(&self) -> Result<Url> {
        self.base
            .read()
            .clone()
            .ok_or_else(|| VfsError::Failed("Not mounted".to_string()))
    }

    pub(crate) fn uri_for(&self, path: &str, is_dir: bool) -> Result<Url> {
        Ok(uri_for_path(&self.base()?, path, is_dir))
    }

    pub(crate) async fn send(&self, job: &JobContext, request: HttpRequest) -> Result<HttpResponse> {
        Ok(self.session.send(job, request).await?)
    }

    /// Sends a request whose body is irrelevant and returns the drained response.
    async fn send_and_skip(&self, job: &JobContext, request: HttpRequest) -> Result<HttpResponse> {
        let mut response = self.send(job, request).await?;
        response.skip().await?;
        Ok(response)
    }

    /// Failure of a mutating request. `412` and redirects mean the target exists.
    pub(crate) fn mutation_failure(response: &HttpResponse) -> VfsError {
        if response.status == 412 || response.is_redirection() {
            exists_error()
        } else {
            response.error()
        }
    }

    async fn propfind(
        &self,
        job: &JobContext,
        uri: Url,
        depth: Depth,
        properties: &[&str],
        nofollow: bool,
    ) -> Result<Multistatus> {
        let request = HttpRequest::new(Method::Propfind, uri)
            .header(HEADER_DEPTH, HeaderValue::from_static(depth.as_header()))
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/xml; charset=\"utf-8\""),
            )
            .header(
                HEADER_APPLY_TO_REDIRECT_REF,
                HeaderValue::from_static(if nofollow { "F" } else { "T" }),
            )
            .body(RequestBody::Bytes(propfind_body(properties)));
        let response = self.send(job, request).await?;
        let (status, reason, url) = (response.status, response.reason.clone(), response.url.clone());
        let body = response.bytes().await?;
        Multistatus::from_status_and_body(status, &reason, &url, &body)
    }

    /// Minimal stat of `uri`; requires a real 207 answer.
    pub(crate) async fn stat(&self, job: &JobContext, uri: Url, count_children: bool) -> Result<Stat> {
        let depth = if count_children { Depth::One } else { Depth::Zero };
        let request = HttpRequest::new(Method::Propfind, uri)
            .header(HEADER_DEPTH, HeaderValue::from_static(depth.as_header()))
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/xml; charset=\"utf-8\""),
            )
            .body(RequestBody::Bytes(propfind_body(STAT_PROPERTIES)));
        let response = self.send(job, request).await?;
        if response.status != 207 {
            let mut response = response;
            response.skip().await?;
            return Err(response.error());
        }
        let url = response.url.clone();
        let body = response.bytes().await?;
        let ms = Multistatus::from_body(&url, &body)?;

        let mut stat = None;
        let mut children = 0;
        for entry in ms.responses() {
            if entry.is_target {
                stat = Some(Stat {
                    file_type: entry.file_type(),
                    size: entry.content_length(),
                    children: 0,
                });
            } else {
                children += 1;
            }
        }
        let mut stat = stat.ok_or_else(|| VfsError::Failed("Response invalid".to_string()))?;
        stat.children = children;
        Ok(stat)
    }

    /// Stat that reports a missing resource as `None`.
    async fn stat_if_exists(&self, job: &JobContext, uri: Url) -> Result<Option<Stat>> {
        match self.stat(job, uri, false).await {
            Ok(stat) => Ok(Some(stat)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn release_certificate(&self, host: &str) {
        if !self.session.transport().certificates().release(host) {
            debug!("certificate override for {} still held by another mount", host);
        }
    }

    /// `Destination` header for `uri`, never carrying user info.
    fn destination(uri: &Url) -> Result<HeaderValue> {
        header_value(without_userinfo(uri).as_str())
    }
}

/// WebDAV implementation of [`vfsd_backend::Backend`].
#[derive(Clone)]
pub struct DavBackend {
    inner: Arc<DavInner>,
}

impl DavBackend {
    pub fn new(transport: Arc<dyn HttpTransport>, keyring: Arc<dyn Keyring>, config: &DavConfig) -> Self {
        let session = DavSession::new(transport, AuthManager::new(keyring), config.max_redirects);
        Self {
            inner: Arc::new(DavInner {
                session,
                base: RwLock::new(None),
                certificate_host: Mutex::new(None),
            }),
        }
    }

    /// Mount base after a successful mount.
    pub fn mount_base(&self) -> Option<Url> {
        self.inner.base.read().clone()
    }
}

/// Registers the `dav` and `davs` mount types.
pub fn register(
    registry: &mut BackendRegistry,
    transport: Arc<dyn HttpTransport>,
    keyring: Arc<dyn Keyring>,
    config: DavConfig,
) {
    for mount_type in ["dav", "davs"] {
        let transport = transport.clone();
        let keyring = keyring.clone();
        let config = config.clone();
        registry.register(
            mount_type,
            Arc::new(move || -> Arc<dyn Backend> {
                Arc::new(DavBackend::new(transport.clone(), keyring.clone(), &config))
            }),
        );
    }
}

#[async_trait]
impl Mountable for DavBackend {
    async fn mount(
        &self,
        job: &JobContext,
        spec: &MountSpec,
        source: Arc<dyn MountSource>,
        is_automount: bool,
    ) -> Result<MountInfo> {
        trace!("mount({})", spec);
        let base = mount::uri_from_spec(spec)?;
        let auth = self.inner.session.auth();
        auth.begin_mount(&base, source.clone(), is_automount);

        let discovered = mount::discover(&self.inner.session, job, &base, source.as_ref()).await?;
        let previous = std::mem::replace(
            &mut *self.inner.certificate_host.lock(),
            discovered.certificate_host,
        );
        if let Some(host) = previous {
            self.inner.release_certificate(&host);
        }
        let root = discovered.root;
        auth.save_to_keyring(&root).await;
        debug!("mounted at {}", without_userinfo(&root));

        let info = MountInfo {
            spec: mount::spec_from_uri(&root),
            display_name: mount::display_name(&root),
            icon: MOUNT_ICON.to_string(),
            symbolic_icon: MOUNT_SYMBOLIC_ICON.to_string(),
        };
        *self.inner.base.write() = Some(root);
        Ok(info)
    }

    async fn unmount(&self, _job: &JobContext) -> Result<()> {
        trace!("unmount()");
        self.inner.base.write().take();
        let held = self.inner.certificate_host.lock().take();
        if let Some(host) = held {
            self.inner.release_certificate(&host);
        }
        self.inner.session.auth().forget();
        Ok(())
    }
}

#[async_trait]
impl QueryInfo for DavBackend {
    async fn query_info(
        &self,
        job: &JobContext,
        path: &str,
        flags: QueryInfoFlags,
        _attributes: &AttributeMatcher,
    ) -> Result<FileInfo> {
        trace!("query_info({:?})", path);
        let uri = self.inner.uri_for(path, false)?;
        let ms = self
            .inner
            .propfind(job, uri, Depth::Zero, LS_PROPERTIES, flags.nofollow_symlinks)
            .await?;
        let target = ms
            .target()
            .ok_or_else(|| VfsError::Failed("Response invalid".to_string()))?;
        Ok(target.to_file_info())
    }

    async fn query_fs_info(
        &self,
        job: &JobContext,
        path: &str,
        attributes: &AttributeMatcher,
    ) -> Result<FsInfo> {
        trace!("query_fs_info({:?})", path);
        let mut info = FsInfo {
            fs_type: "webdav".to_string(),
            remote: true,
            ..FsInfo::default()
        };
        if !attributes.matches_any(FS_ATTRIBUTES) {
            return Ok(info);
        }
        let uri = self.inner.uri_for(path, true)?;
        let ms = self
            .inner
            .propfind(job, uri, Depth::Zero, QUOTA_PROPERTIES, false)
            .await?;
        if let Some(target) = ms.target() {
            target.fill_fs_info(&mut info);
        }
        Ok(info)
    }
}

#[async_trait]
impl Enumerate for DavBackend {
    async fn enumerate(
        &self,
        job: &JobContext,
        path: &str,
        flags: QueryInfoFlags,
        _attributes: &AttributeMatcher,
    ) -> Result<Vec<FileInfo>> {
        trace!("enumerate({:?})", path);
        let uri = self.inner.uri_for(path, true)?;
        let ms = self
            .inner
            .propfind(job, uri, Depth::One, LS_PROPERTIES, flags.nofollow_symlinks)
            .await?;
        if let Some(target) = ms.target() {
            if target.file_type() != FileType::Directory {
                return Err(VfsError::NotDirectory(
                    "The file is not a directory".to_string(),
                ));
            }
        }
        Ok(ms
            .responses()
            .filter(|entry| !entry.is_target)
            .map(|entry| entry.to_file_info())
            .collect())
    }
}

#[async_trait]
impl OpenRead for DavBackend {
    async fn open_for_read(&self, job: &JobContext, path: &str) -> Result<Box<dyn ReadHandle>> {
        trace!("open_for_read({:?})", path);
        let uri = self.inner.uri_for(path, false)?;
        let ms = self
            .inner
            .propfind(job, uri.clone(), Depth::Zero, LS_PROPERTIES, false)
            .await?;
        let info = ms
            .target()
            .ok_or_else(|| VfsError::Failed("Response invalid".to_string()))?
            .to_file_info();
        if info.is_dir() {
            return Err(VfsError::IsDirectory("File is directory".to_string()));
        }
        let mut stream = DavReadStream::new(self.inner.clone(), uri, info);
        stream.start(job).await?;
        Ok(Box::new(stream))
    }
}

#[async_trait]
impl OpenWrite for DavBackend {
    async fn create(&self, job: &JobContext, path: &str) -> Result<Box<dyn WriteHandle>> {
        trace!("create({:?})", path);
        let uri = self.inner.uri_for(path, false)?;
        let response = self
            .inner
            .send_and_skip(job, HttpRequest::new(Method::Head, uri.clone()))
            .await?;
        if response.is_success() {
            return Err(exists_error());
        }
        Ok(Box::new(DavWriteStream::new(
            self.inner.clone(),
            uri,
            basename(path),
            Vec::new(),
            None,
        )))
    }

    async fn replace(
        &self,
        job: &JobContext,
        path: &str,
        options: &ReplaceOptions,
    ) -> Result<Box<dyn WriteHandle>> {
        trace!("replace({:?}, {:?})", path, options);
        if options.make_backup {
            return Err(VfsError::CantCreateBackup(
                "Backup file creation failed".to_string(),
            ));
        }
        let uri = self.inner.uri_for(path, false)?;
        if let Some(etag) = &options.etag {
            let request =
                HttpRequest::new(Method::Head, uri.clone()).header(IF_MATCH, header_value(etag)?);
            let response = self.inner.send_and_skip(job, request).await?;
            if response.status == 412 {
                return Err(VfsError::WrongETag(
                    "The file was externally modified".to_string(),
                ));
            }
            if !response.is_success() {
                return Err(response.error());
            }
        }
        Ok(Box::new(DavWriteStream::new(
            self.inner.clone(),
            uri,
            basename(path),
            Vec::new(),
            options.etag.clone(),
        )))
    }

    async fn append_to(&self, job: &JobContext, path: &str) -> Result<Box<dyn WriteHandle>> {
        trace!("append_to({:?})", path);
        let uri = self.inner.uri_for(path, false)?;
        let mut response = self
            .inner
            .send(job, HttpRequest::new(Method::Get, uri.clone()))
            .await?;
        let (content, etag) = if response.status == 404 {
            response.skip().await?;
            (Vec::new(), None)
        } else if response.is_success() {
            let etag = response.header_str(ETAG.as_str()).map(str::to_string);
            (response.bytes().await?.to_vec(), etag)
        } else {
            response.skip().await?;
            return Err(response.error());
        };
        Ok(Box::new(DavWriteStream::new(
            self.inner.clone(),
            uri,
            basename(path),
            content,
            etag,
        )))
    }
}

#[async_trait]
impl Mutate for DavBackend {
    async fn make_directory(&self, job: &JobContext, path: &str) -> Result<()> {
        trace!("make_directory({:?})", path);
        let uri = self.inner.uri_for(path, true)?;
        let response = self
            .inner
            .send_and_skip(job, HttpRequest::new(Method::Mkcol, uri))
            .await?;
        match response.status {
            s if (200..300).contains(&s) => Ok(()),
            405 => Err(exists_error()),
            409 => Err(VfsError::NotFound("No such file or directory".to_string())),
            _ => Err(DavInner::mutation_failure(&response)),
        }
    }

    async fn delete(&self, job: &JobContext, path: &str) -> Result<()> {
        trace!("delete({:?})", path);
        let uri = self.inner.uri_for(path, false)?;
        let stat = self.inner.stat(job, uri.clone(), true).await?;
        if stat.is_dir() && stat.children > 0 {
            return Err(VfsError::NotEmpty("Directory not empty".to_string()));
        }
        let uri = if stat.is_dir() {
            self.inner.uri_for(path, true)?
        } else {
            uri
        };
        let response = self
            .inner
            .send_and_skip(job, HttpRequest::new(Method::Delete, uri))
            .await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(DavInner::mutation_failure(&response))
        }
    }

    async fn set_display_name(
        &self,
        job: &JobContext,
        path: &str,
        display_name: &str,
    ) -> Result<String> {
        trace!("set_display_name({:?}, {:?})", path, display_name);
        if display_name.is_empty() || display_name.contains('/') {
            return Err(VfsError::InvalidArgument("Invalid filename".to_string()));
        }
        let new_path = build_path(&[&parent_dir(path), display_name]);
        let source = self.inner.uri_for(path, false)?;
        let target = self.inner.uri_for(&new_path, false)?;
        let request = HttpRequest::new(Method::Move, source)
            .header(HEADER_DESTINATION, DavInner::destination(&target)?)
            .header(HEADER_OVERWRITE, overwrite_header(false));
        let response = self.inner.send_and_skip(job, request).await?;
        if response.is_success() {
            Ok(new_path)
        } else {
            Err(DavInner::mutation_failure(&response))
        }
    }

    async fn move_to(
        &self,
        job: &JobContext,
        source: &str,
        destination: &str,
        flags: CopyFlags,
    ) -> Result<()> {
        trace!("move_to({:?}, {:?}, {:?})", source, destination, flags);
        if flags.backup {
            return Err(if flags.no_fallback_for_move {
                VfsError::CantCreateBackup("Backup file creation failed".to_string())
            } else {
                VfsError::NotSupported("Operation not supported".to_string())
            });
        }
        let source_uri = self.inner.uri_for(source, false)?;
        let target_uri = self.inner.uri_for(destination, false)?;

        let mut source_size = None;
        if let Some(target) = self.inner.stat_if_exists(job, target_uri.clone()).await? {
            if !flags.overwrite {
                return Err(exists_error());
            }
            let source_stat = self.inner.stat(job, source_uri.clone(), false).await?;
            source_size = source_stat.size;
            match (target.is_dir(), source_stat.is_dir()) {
                (true, true) => {
                    return Err(VfsError::WouldMerge(
                        "Can't move directory over directory".to_string(),
                    ))
                }
                (true, false) => {
                    return Err(VfsError::IsDirectory(
                        "Can't move over directory".to_string(),
                    ))
                }
                (false, true) => {
                    debug!("move: deleting file {:?} to make room", destination);
                    let response = self
                        .inner
                        .send_and_skip(job, HttpRequest::new(Method::Delete, target_uri.clone()))
                        .await?;
                    if !response.is_success() {
                        return Err(DavInner::mutation_failure(&response));
                    }
                }
                (false, false) => {}
            }
        }

        let request = HttpRequest::new(Method::Move, source_uri)
            .header(HEADER_DESTINATION, DavInner::destination(&target_uri)?)
            .header(HEADER_OVERWRITE, overwrite_header(flags.overwrite));
        let response = self.inner.send_and_skip(job, request).await?;
        if !response.is_success() {
            return Err(DavInner::mutation_failure(&response));
        }
        let size = source_size.unwrap_or(0);
        job.report_progress(size, size);
        Ok(())
    }

    async fn copy(
        &self,
        job: &JobContext,
        source: &str,
        destination: &str,
        flags: CopyFlags,
    ) -> Result<()> {
        trace!("copy({:?}, {:?}, {:?})", source, destination, flags);
        if flags.backup {
            return Err(VfsError::NotSupported("Operation not supported".to_string()));
        }
        let source_uri = self.inner.uri_for(source, false)?;
        let target_uri = self.inner.uri_for(destination, false)?;

        let source_stat = self.inner.stat(job, source_uri.clone(), false).await?;
        if let Some(target) = self.inner.stat_if_exists(job, target_uri.clone()).await? {
            if !flags.overwrite {
                return Err(exists_error());
            }
            if target.is_dir() {
                return Err(if source_stat.is_dir() {
                    VfsError::WouldMerge("Can't copy directory over directory".to_string())
                } else {
                    VfsError::IsDirectory("File is directory".to_string())
                });
            }
        }
        if source_stat.is_dir() {
            return Err(VfsError::WouldRecurse(
                "Can't recursively copy directory".to_string(),
            ));
        }

        let request = HttpRequest::new(Method::Copy, source_uri)
            .header(HEADER_DESTINATION, DavInner::destination(&target_uri)?)
            .header(HEADER_OVERWRITE, overwrite_header(flags.overwrite));
        let response = self.inner.send_and_skip(job, request).await?;
        if !response.is_success() {
            return Err(DavInner::mutation_failure(&response));
        }
        let size = source_stat.size.unwrap_or(0);
        job.report_progress(size, size);
        Ok(())
    }
}

#[async_trait]
impl Push for DavBackend {
    async fn push(
        &self,
        job: &JobContext,
        destination: &str,
        local_path: &Path,
        flags: CopyFlags,
        remove_source: bool,
    ) -> Result<()> {
        trace!("push({:?}, {:?}, {:?})", destination, local_path, flags);
        let metadata = tokio::fs::symlink_metadata(local_path).await?;
        let metadata = if metadata.file_type().is_symlink() {
            if flags.nofollow_symlinks {
                return Err(VfsError::NotSupported("Not supported".to_string()));
            }
            tokio::fs::metadata(local_path).await?
        } else {
            metadata
        };
        if metadata.is_dir() {
            return Err(VfsError::NotSupported("Not supported".to_string()));
        }

        let uri = self.inner.uri_for(destination, false)?;
        if let Some(target) = self.inner.stat_if_exists(job, uri.clone()).await? {
            if !flags.overwrite {
                return Err(exists_error());
            }
            if target.is_dir() {
                return Err(VfsError::IsDirectory("File is directory".to_string()));
            }
        }

        let length = metadata.len();
        let progress_job = job.clone();
        let request = HttpRequest::new(Method::Put, uri).body(RequestBody::File {
            path: local_path.to_path_buf(),
            length,
            progress: Some(Arc::new(move |sent, total| {
                progress_job.report_progress(sent, total)
            })),
        });
        let sent = self.inner.send_and_skip(job, request).await;
        // The body is cut to the length read up front, so a changed file must fail here.
        let now = tokio::fs::metadata(local_path).await.map(|m| m.len()).ok();
        if now != Some(length) {
            debug!("push: {:?} changed from {} to {:?} bytes", local_path, length, now);
            return Err(VfsError::Failed(
                "File length changed during transfer".to_string(),
            ));
        }
        let response = sent?;
        if !response.is_success() {
            return Err(DavInner::mutation_failure(&response));
        }

        if remove_source {
            tokio::fs::remove_file(local_path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Monitor for DavBackend {}

/// PUT of buffered content, conditional on `etag` when one is given.
pub(crate) fn put_request(uri: Url, content: Bytes, etag: Option<&str>) -> Result<HttpRequest> {
    let mut request = HttpRequest::new(Method::Put, uri).body(RequestBody::Bytes(content));
    if let Some(etag) = etag {
        request = request.header(IF_MATCH, header_value(etag)?);
    }
    Ok(request)
}
