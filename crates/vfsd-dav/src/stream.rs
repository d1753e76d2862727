//! Open file handles.
//!
//! Reads stream a GET response; a seek drops it and the next read asks for a
//! range. Writes collect into memory and go out as a single PUT on close.

use crate::backend::{put_request, DavInner};
use crate::mime;
use crate::transport::{HttpRequest, HttpResponse, Method, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, trace};
use reqwest::header::{HeaderValue, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use std::io::SeekFrom;
use std::sync::Arc;
use url::Url;
use vfsd_backend::{
    AttributeMatcher, FileInfo, FileType, JobContext, ReadHandle, Result, VfsError, WriteHandle,
};

fn seek_target(current: u64, length: Option<u64>, pos: SeekFrom) -> Result<u64> {
    let invalid = || VfsError::InvalidArgument("Invalid seek request".to_string());
    match pos {
        SeekFrom::Start(offset) => Ok(offset),
        SeekFrom::Current(delta) => current.checked_add_signed(delta).ok_or_else(invalid),
        SeekFrom::End(delta) => {
            let length = length.ok_or_else(|| {
                VfsError::NotSupported("Seek from end needs a known length".to_string())
            })?;
            length.checked_add_signed(delta).ok_or_else(invalid)
        }
    }
}

/// Total length from a `Content-Range: bytes a-b/total` header.
fn content_range_total(response: &HttpResponse) -> Option<u64> {
    response
        .header_str(CONTENT_RANGE.as_str())?
        .rsplit('/')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Read handle over a GET.
pub struct DavReadStream {
    inner: Arc<DavInner>,
    uri: Url,
    info: FileInfo,
    position: u64,
    length: Option<u64>,
    response: Option<HttpResponse>,
    pending: Bytes,
}

impl DavReadStream {
    pub(crate) fn new(inner: Arc<DavInner>, uri: Url, info: FileInfo) -> Self {
        let length = info.size;
        Self {
            inner,
            uri,
            info,
            position: 0,
            length,
            response: None,
            pending: Bytes::new(),
        }
    }

    /// Issues the GET for the current position.
    ///
    /// Returns `false` when the position is at or past the end.
    pub(crate) async fn start(&mut self, job: &JobContext) -> Result<bool> {
        let mut request = HttpRequest::new(Method::Get, self.uri.clone());
        if self.position > 0 {
            let range = format!("bytes={}-", self.position);
            request = request.header(
                RANGE,
                HeaderValue::from_str(&range)
                    .map_err(|e| VfsError::InvalidArgument(e.to_string()))?,
            );
        }
        let mut response = self.inner.send(job, request).await?;
        match response.status {
            200 if self.position > 0 => {
                response.skip().await?;
                Err(VfsError::NotSupported("Error seeking in stream".to_string()))
            }
            200 => {
                if self.length.is_none() {
                    self.length = response
                        .header_str(CONTENT_LENGTH.as_str())
                        .and_then(|v| v.trim().parse().ok());
                }
                self.response = Some(response);
                Ok(true)
            }
            206 => {
                if let Some(total) = content_range_total(&response) {
                    self.length = Some(total);
                }
                self.response = Some(response);
                Ok(true)
            }
            416 => {
                debug!("read: range starting at {} is past the end", self.position);
                response.skip().await?;
                Ok(false)
            }
            _ => {
                response.skip().await?;
                Err(response.error())
            }
        }
    }

    async fn next_chunk(&mut self, job: &JobContext) -> Result<Option<Bytes>> {
        let Some(response) = self.response.as_mut() else {
            return Ok(None);
        };
        let chunk = tokio::select! {
            biased;
            _ = job.cancellation().cancelled() => Err(TransportError::Cancelled),
            chunk = response.chunk() => chunk,
        }?;
        if chunk.is_none() {
            self.response = None;
        }
        Ok(chunk)
    }
}

#[async_trait]
impl ReadHandle for DavReadStream {
    async fn read(&mut self, job: &JobContext, count: usize) -> Result<Bytes> {
        if count == 0 {
            return Ok(Bytes::new());
        }
        if self.pending.is_empty() {
            if self.response.is_none() {
                if self.length.is_some_and(|len| self.position >= len) {
                    return Ok(Bytes::new());
                }
                if !self.start(job).await? {
                    return Ok(Bytes::new());
                }
            }
            loop {
                match self.next_chunk(job).await? {
                    Some(chunk) if chunk.is_empty() => continue,
                    Some(chunk) => {
                        self.pending = chunk;
                        break;
                    }
                    None => return Ok(Bytes::new()),
                }
            }
        }
        let n = count.min(self.pending.len());
        let out = self.pending.split_to(n);
        self.position += n as u64;
        Ok(out)
    }

    async fn seek(&mut self, _job: &JobContext, pos: SeekFrom) -> Result<u64> {
        let target = seek_target(self.position, self.length, pos)?;
        trace!("read seek {} -> {}", self.position, target);
        if target != self.position {
            self.response = None;
            self.pending = Bytes::new();
            self.position = target;
        }
        Ok(self.position)
    }

    async fn query_info(
        &mut self,
        _job: &JobContext,
        _attributes: &AttributeMatcher,
    ) -> Result<FileInfo> {
        Ok(self.info.clone())
    }

    async fn close(&mut self, _job: &JobContext) -> Result<()> {
        self.response = None;
        self.pending = Bytes::new();
        Ok(())
    }
}

/// Zero-extends `buffer` to `len` bytes.
fn grow(buffer: &mut Vec<u8>, len: usize) -> Result<()> {
    if len > buffer.len() {
        buffer
            .try_reserve(len - buffer.len())
            .map_err(|_| VfsError::NoSpace("Not enough memory for write buffer".to_string()))?;
        buffer.resize(len, 0);
    }
    Ok(())
}

/// Write handle that uploads on close.
pub struct DavWriteStream {
    inner: Arc<DavInner>,
    uri: Url,
    name: String,
    buffer: Vec<u8>,
    position: u64,
    /// `If-Match` precondition for the final PUT.
    etag: Option<String>,
    closed: bool,
}

impl DavWriteStream {
    pub(crate) fn new(
        inner: Arc<DavInner>,
        uri: Url,
        name: String,
        content: Vec<u8>,
        etag: Option<String>,
    ) -> Self {
        let position = content.len() as u64;
        Self {
            inner,
            uri,
            name,
            buffer: content,
            position,
            etag,
            closed: false,
        }
    }
}

#[async_trait]
impl WriteHandle for DavWriteStream {
    async fn write(&mut self, _job: &JobContext, data: &[u8]) -> Result<usize> {
        let start = usize::try_from(self.position)
            .map_err(|_| VfsError::InvalidArgument("Invalid seek request".to_string()))?;
        let end = start
            .checked_add(data.len())
            .ok_or_else(|| VfsError::InvalidArgument("Invalid seek request".to_string()))?;
        grow(&mut self.buffer, end)?;
        self.buffer[start..end].copy_from_slice(data);
        self.position = end as u64;
        Ok(data.len())
    }

    async fn seek(&mut self, _job: &JobContext, pos: SeekFrom) -> Result<u64> {
        self.position = seek_target(self.position, Some(self.buffer.len() as u64), pos)?;
        Ok(self.position)
    }

    async fn truncate(&mut self, _job: &JobContext, size: u64) -> Result<()> {
        let size = usize::try_from(size)
            .map_err(|_| VfsError::InvalidArgument("Invalid truncate size".to_string()))?;
        grow(&mut self.buffer, size)?;
        self.buffer.truncate(size);
        Ok(())
    }

    async fn query_info(
        &mut self,
        _job: &JobContext,
        _attributes: &AttributeMatcher,
    ) -> Result<FileInfo> {
        let content_type = mime::guess_content_type(&self.name).to_string();
        Ok(FileInfo {
            name: self.name.clone(),
            edit_name: self.name.clone(),
            display_name: self.name.clone(),
            file_type: FileType::Regular,
            size: Some(self.buffer.len() as u64),
            icon: mime::icon_names(&content_type, false),
            symbolic_icon: mime::icon_names(&content_type, true),
            content_type: Some(content_type),
            etag: self.etag.clone(),
            is_hidden: self.name.starts_with('.'),
            ..FileInfo::default()
        })
    }

    async fn close(&mut self, job: &JobContext) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        trace!("close write {} ({} bytes)", self.uri, self.buffer.len());
        // Kept until the server answers; a close that never got a response can be retried.
        let content = Bytes::copy_from_slice(&self.buffer);
        let request = put_request(self.uri.clone(), content, self.etag.as_deref())?;
        let mut response = self.inner.send(job, request).await?;
        self.closed = true;
        response.skip().await?;
        if response.is_success() {
            return Ok(());
        }
        if response.status == 412 && self.etag.is_some() {
            return Err(VfsError::WrongETag(
                "The file was externally modified".to_string(),
            ));
        }
        Err(DavInner::mutation_failure(&response))
    }
}
