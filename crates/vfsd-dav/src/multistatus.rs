//! Multistatus (207) response parsing.
//!
//! A PROPFIND answer is read into a small element tree first; resource
//! descriptors are then produced lazily from that tree. Only `2xx` propstat
//! blocks contribute properties and unknown property names are ignored.
//!
//! ```ignore
//! let ms = Multistatus::from_body(&request_url, &body)?;
//! for response in ms.responses().filter(|r| !r.is_target) {
//!     println!("{}", response.to_file_info().name);
//! }
//! ```

use crate::mime;
use crate::path::{basename, decode_path, path_equal};
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{trace, warn};
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use url::Url;
use vfsd_backend::{FileInfo, FileType, FsInfo, Result, VfsError};

const DAV_NS: &str = "DAV:";

/// Properties asked for by query-info and enumerate.
pub const LS_PROPERTIES: &[&str] = &[
    "creationdate",
    "displayname",
    "getcontentlength",
    "getcontenttype",
    "getetag",
    "getlastmodified",
    "resourcetype",
];

/// Properties asked for by internal existence/type checks.
pub const STAT_PROPERTIES: &[&str] = &["resourcetype", "getcontentlength"];

pub const QUOTA_PROPERTIES: &[&str] = &["quota-available-bytes", "quota-used-bytes"];

/// Value of the `Depth` request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
}

impl Depth {
    pub fn as_header(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
        }
    }
}

/// Builds a `<D:propfind>` body requesting the given `DAV:` properties.
pub fn propfind_body(properties: &[&str]) -> Bytes {
    let mut body = String::from("<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n");
    body.push_str("<D:propfind xmlns:D=\"DAV:\">\n<D:prop>\n");
    for property in properties {
        body.push_str("<D:");
        body.push_str(property);
        body.push_str("/>\n");
    }
    body.push_str("</D:prop>\n</D:propfind>\n");
    Bytes::from(body)
}

#[derive(Debug, Clone, Default)]
struct XmlElement {
    ns: Option<String>,
    name: String,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn has_name_ns(&self, name: &str, ns: &str) -> bool {
        self.name == name
            && self
                .ns
                .as_deref()
                .is_some_and(|own| own.eq_ignore_ascii_case(ns))
    }

    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.text.is_empty()
    }

    fn child(&self, name: &str, ns: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.has_name_ns(name, ns))
    }

    fn children_named<'a>(
        &'a self,
        name: &'a str,
        ns: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.has_name_ns(name, ns))
    }
}

fn parse_error() -> VfsError {
    VfsError::Parse("Could not parse response".to_string())
}

fn element_from(ns: ResolveResult<'_>, local_name: &[u8]) -> XmlElement {
    let ns = match ns {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    };
    XmlElement {
        ns,
        name: String::from_utf8_lossy(local_name).into_owned(),
        ..XmlElement::default()
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn parse_tree(body: &[u8]) -> Result<XmlElement> {
    let mut reader = NsReader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_resolved_event_into(&mut buf) {
            Ok((ns, Event::Start(e))) => {
                let element = element_from(ns, e.local_name().as_ref());
                stack.push(element);
            }
            Ok((ns, Event::Empty(e))) => {
                let element = element_from(ns, e.local_name().as_ref());
                attach(&mut stack, &mut root, element);
            }
            Ok((_, Event::End(_))) => {
                let element = stack.pop().ok_or_else(parse_error)?;
                attach(&mut stack, &mut root, element);
            }
            Ok((_, Event::Text(t))) => {
                let text = t.unescape().map_err(|_| parse_error())?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok((_, Event::CData(c))) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok((_, Event::Eof)) => break,
            Ok(_) => {}
            Err(err) => {
                trace!("xml parse error: {}", err);
                return Err(parse_error());
            }
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(parse_error());
    }
    root.ok_or_else(parse_error)
}

/// One recognized property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    ResourceType(FileType),
    DisplayName(String),
    ContentLength(u64),
    ContentType(String),
    ETag(String),
    CreationDate(DateTime<Utc>),
    LastModified(DateTime<Utc>),
    QuotaAvailable(u64),
    QuotaUsed(u64),
}

/// A `<propstat>` block: its status and the properties under `<prop>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Propstat {
    pub status: u16,
    pub properties: Vec<Property>,
}

impl Propstat {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One `<response>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct MsResponse {
    /// Decoded path of the `href`, resolved against the request URI.
    pub path: String,
    /// Whether this describes the request URI itself rather than a child.
    pub is_target: bool,
    pub propstats: Vec<Propstat>,
}

/// A parsed 207 body.
#[derive(Debug, Clone)]
pub struct Multistatus {
    root: XmlElement,
    target: Url,
    target_path: String,
}

impl Multistatus {
    /// Parses a multistatus body returned for a request to `target`.
    pub fn from_body(target: &Url, body: &[u8]) -> Result<Self> {
        let root = parse_tree(body)?;

        if root.is_empty() {
            return Err(VfsError::EmptyResponse);
        }
        if !root.has_name_ns("multistatus", DAV_NS) {
            return Err(VfsError::Parse("Unexpected reply from server".to_string()));
        }

        let target_path = decode_path(target.path()).unwrap_or_else(|| target.path().to_string());
        Ok(Self {
            root,
            target: target.clone(),
            target_path,
        })
    }

    /// Checks the HTTP status of a PROPFIND and parses its body.
    pub fn from_status_and_body(status: u16, reason: &str, target: &Url, body: &[u8]) -> Result<Self> {
        if !(200..300).contains(&status) {
            return Err(VfsError::from_status(status, reason));
        }
        Self::from_body(target, body)
    }

    /// Resource descriptors in document order.
    pub fn responses(&self) -> impl Iterator<Item = MsResponse> + '_ {
        self.root
            .children_named("response", DAV_NS)
            .filter_map(move |node| self.response_from(node))
    }

    /// The descriptor of the request URI itself, if the server sent one.
    pub fn target(&self) -> Option<MsResponse> {
        self.responses().find(|r| r.is_target)
    }

    fn response_from(&self, node: &XmlElement) -> Option<MsResponse> {
        let href = node.child("href", DAV_NS)?;
        if href.text.is_empty() {
            return None;
        }
        let uri = match self.target.join(&href.text) {
            Ok(uri) => uri,
            Err(err) => {
                warn!("ignoring response with bad href {:?}: {}", href.text, err);
                return None;
            }
        };
        let path = decode_path(uri.path())?;
        let is_target = path_equal(&path, &self.target_path, true);
        let propstats = node
            .children_named("propstat", DAV_NS)
            .filter_map(parse_propstat)
            .collect();

        Some(MsResponse {
            path,
            is_target,
            propstats,
        })
    }
}

/// Reads the code out of an `HTTP/1.1 200 OK` status line.
fn parse_status_line(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    let version = parts.next()?;
    if !version.starts_with("HTTP/") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    code.parse().ok()
}

fn parse_propstat(node: &XmlElement) -> Option<Propstat> {
    let status_node = node.child("status", DAV_NS)?;
    let prop = node.child("prop", DAV_NS)?;
    let status = match parse_status_line(&status_node.text) {
        Some(status) => status,
        None => {
            warn!("ignoring propstat with status {:?}", status_node.text);
            return None;
        }
    };
    let properties = prop
        .children
        .iter()
        .filter(|p| !p.is_empty())
        .filter_map(parse_property)
        .collect();
    Some(Propstat { status, properties })
}

fn parse_resourcetype(node: &XmlElement) -> FileType {
    match node.children.first() {
        None => FileType::Regular,
        Some(child) if child.name == "collection" => FileType::Directory,
        Some(child) if child.name == "redirectref" => FileType::SymbolicLink,
        Some(_) => FileType::Unknown,
    }
}

fn parse_u64(text: &str) -> Option<u64> {
    text.trim().parse().ok()
}

/// Parses an HTTP date: RFC 1123, RFC 850 or asctime.
fn parse_http_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(text) {
        return Some(date.with_timezone(&Utc));
    }
    ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_property(node: &XmlElement) -> Option<Property> {
    let text = node.text.as_str();
    let property = match node.name.as_str() {
        "resourcetype" => Property::ResourceType(parse_resourcetype(node)),
        "displayname" => Property::DisplayName(text.to_string()),
        "getetag" => Property::ETag(text.to_string()),
        "getcontenttype" => Property::ContentType(text.to_string()),
        "getcontentlength" => Property::ContentLength(parse_u64(text)?),
        "quota-available-bytes" => Property::QuotaAvailable(parse_u64(text)?),
        "quota-used-bytes" => Property::QuotaUsed(parse_u64(text)?),
        "creationdate" => match DateTime::parse_from_rfc3339(text.trim()) {
            Ok(date) => Property::CreationDate(date.with_timezone(&Utc)),
            Err(err) => {
                warn!("unparseable creationdate {:?}: {}", text, err);
                return None;
            }
        },
        "getlastmodified" => match parse_http_date(text) {
            Some(date) => Property::LastModified(date),
            None => {
                warn!("unparseable getlastmodified {:?}", text);
                return None;
            }
        },
        _ => return None,
    };
    Some(property)
}

impl MsResponse {
    pub fn basename(&self) -> String {
        basename(&self.path)
    }

    /// Properties from successful propstat blocks only.
    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.propstats
            .iter()
            .filter(|p| p.is_success())
            .flat_map(|p| p.properties.iter())
    }

    pub fn file_type(&self) -> FileType {
        self.properties()
            .filter_map(|p| match p {
                Property::ResourceType(t) => Some(*t),
                _ => None,
            })
            .last()
            .unwrap_or(FileType::Regular)
    }

    /// Reported content length; never trusted for collections.
    pub fn content_length(&self) -> Option<u64> {
        if self.file_type() == FileType::Directory {
            return None;
        }
        self.properties()
            .filter_map(|p| match p {
                Property::ContentLength(len) => Some(*len),
                _ => None,
            })
            .last()
    }

    pub fn to_file_info(&self) -> FileInfo {
        let name = self.basename();
        let mut info = FileInfo {
            edit_name: name.clone(),
            is_hidden: name.starts_with('.'),
            can_trash: false,
            file_type: FileType::Regular,
            name,
            ..FileInfo::default()
        };

        let mut content_type = None;
        let mut display_name = None;
        for property in self.properties() {
            match property {
                Property::ResourceType(t) => info.file_type = *t,
                Property::DisplayName(name) => display_name = Some(name.clone()),
                Property::ETag(etag) => info.etag = Some(etag.clone()),
                Property::CreationDate(date) => info.created = Some(*date),
                Property::LastModified(date) => info.modified = Some(*date),
                Property::ContentType(value) => content_type = mime::normalize_content_type(value),
                Property::ContentLength(len) => info.size = Some(*len),
                Property::QuotaAvailable(_) | Property::QuotaUsed(_) => {}
            }
        }

        let content_type = if info.file_type == FileType::Directory {
            info.size = None;
            mime::DIRECTORY_TYPE.to_string()
        } else {
            content_type.unwrap_or_else(|| mime::guess_content_type(&info.name).to_string())
        };
        info.icon = mime::icon_names(&content_type, false);
        info.symbolic_icon = mime::icon_names(&content_type, true);
        info.content_type = Some(content_type);
        info.display_name = display_name.unwrap_or_else(|| info.name.clone());
        info
    }

    /// Fills quota fields of `info`.
    pub fn fill_fs_info(&self, info: &mut FsInfo) {
        let mut free = None;
        let mut used = None;
        for property in self.properties() {
            match property {
                Property::QuotaAvailable(n) => free = Some(*n),
                Property::QuotaUsed(n) => used = Some(*n),
                _ => {}
            }
        }
        info.free = free;
        info.used = used;
        // Only report a total when it fits.
        info.size = match (free, used) {
            (Some(free), Some(used)) => free.checked_add(used),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Url {
        Url::parse("https://dav.example.test/docs/").unwrap()
    }

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:oc="http://owncloud.org/ns">
  <d:response>
    <d:href>/docs/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:collection/></d:resourcetype>
        <d:getcontentlength>4096</d:getcontentlength>
        <d:displayname>Documents</d:displayname>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/docs/report%202024.pdf</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype/>
        <d:getcontentlength>1234</d:getcontentlength>
        <d:getcontenttype>application/pdf; charset=binary</d:getcontenttype>
        <d:getetag>"abc"</d:getetag>
        <d:getlastmodified>Tue, 01 Mar 2022 06:39:47 GMT</d:getlastmodified>
        <d:creationdate>2022-03-01T06:00:00Z</d:creationdate>
        <oc:fileid>42</oc:fileid>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
    <d:propstat>
      <d:prop><d:displayname>ignored</d:displayname></d:prop>
      <d:status>HTTP/1.1 404 Not Found</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>https://dav.example.test/docs/.hidden</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:redirectref/></d:resourcetype></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn test_target_detection() {
        let ms = Multistatus::from_body(&target(), LISTING.as_bytes()).unwrap();
        let responses: Vec<_> = ms.responses().collect();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses.iter().filter(|r| r.is_target).count(), 1);
        assert!(responses[0].is_target);
        assert_eq!(responses[1].path, "/docs/report 2024.pdf");
    }

    #[test]
    fn test_collection_drops_size() {
        let ms = Multistatus::from_body(&target(), LISTING.as_bytes()).unwrap();
        let info = ms.target().unwrap().to_file_info();
        assert_eq!(info.file_type, FileType::Directory);
        assert_eq!(info.size, None);
        assert_eq!(info.display_name, "Documents");
        assert_eq!(info.content_type.as_deref(), Some("inode/directory"));
        assert_eq!(info.icon, vec!["folder"]);
    }

    #[test]
    fn test_file_properties() {
        let ms = Multistatus::from_body(&target(), LISTING.as_bytes()).unwrap();
        let file = ms.responses().nth(1).unwrap().to_file_info();
        assert_eq!(file.name, "report 2024.pdf");
        assert_eq!(file.display_name, "report 2024.pdf");
        assert_eq!(file.file_type, FileType::Regular);
        assert_eq!(file.size, Some(1234));
        assert_eq!(file.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(file.etag.as_deref(), Some("\"abc\""));
        assert_eq!(
            file.modified.unwrap().to_rfc3339(),
            "2022-03-01T06:39:47+00:00"
        );
        assert!(file.created.is_some());
        assert!(!file.is_hidden);
    }

    #[test]
    fn test_redirectref_and_hidden() {
        let ms = Multistatus::from_body(&target(), LISTING.as_bytes()).unwrap();
        let link = ms.responses().nth(2).unwrap().to_file_info();
        assert_eq!(link.file_type, FileType::SymbolicLink);
        assert!(link.is_hidden);
    }

    #[test]
    fn test_unknown_resourcetype() {
        let body = r#"<multistatus xmlns="DAV:"><response><href>/docs/cal</href>
            <propstat><prop><resourcetype><calendar xmlns="urn:ietf:params:xml:ns:caldav"/></resourcetype></prop>
            <status>HTTP/1.1 200 OK</status></propstat></response></multistatus>"#;
        let ms = Multistatus::from_body(&target(), body.as_bytes()).unwrap();
        assert_eq!(ms.responses().next().unwrap().file_type(), FileType::Unknown);
    }

    #[test]
    fn test_missing_content_type_is_guessed() {
        let body = r#"<D:multistatus xmlns:D="DAV:"><D:response><D:href>notes.txt</D:href>
            <D:propstat><D:prop><D:getcontenttype></D:getcontenttype></D:prop>
            <D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response></D:multistatus>"#;
        let ms = Multistatus::from_body(&target(), body.as_bytes()).unwrap();
        let info = ms.responses().next().unwrap().to_file_info();
        assert_eq!(info.content_type.as_deref(), Some("text/plain"));
        assert_eq!(info.file_type, FileType::Regular);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Multistatus::from_body(&target(), b"<not-xml"),
            Err(VfsError::Parse(_))
        ));
        assert!(matches!(
            Multistatus::from_body(&target(), b"<D:multistatus xmlns:D=\"DAV:\"/>"),
            Err(VfsError::EmptyResponse)
        ));
        assert!(matches!(
            Multistatus::from_body(&target(), b"<D:prop xmlns:D=\"DAV:\"><D:x/></D:prop>"),
            Err(VfsError::Parse(_))
        ));
    }

    #[test]
    fn test_non_success_status_is_mapped() {
        let err = Multistatus::from_status_and_body(404, "Not Found", &target(), b"").unwrap_err();
        assert!(err.is_not_found());
        let err =
            Multistatus::from_status_and_body(500, "Server Error", &target(), b"").unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_quota() {
        let body = r#"<D:multistatus xmlns:D="DAV:"><D:response><D:href>/docs/</D:href>
            <D:propstat><D:prop>
              <D:quota-available-bytes>18446744073709551615</D:quota-available-bytes>
              <D:quota-used-bytes>10</D:quota-used-bytes>
            </D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response></D:multistatus>"#;
        let ms = Multistatus::from_body(&target(), body.as_bytes()).unwrap();
        let mut info = FsInfo::default();
        ms.target().unwrap().fill_fs_info(&mut info);
        assert_eq!(info.free, Some(u64::MAX));
        assert_eq!(info.used, Some(10));
        assert_eq!(info.size, None);
    }

    #[test]
    fn test_http_date_formats() {
        assert!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").is_some());
        assert!(parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT").is_some());
        assert!(parse_http_date("yesterday").is_none());
    }

    #[test]
    fn test_propfind_body() {
        let body = propfind_body(STAT_PROPERTIES);
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("<D:propfind xmlns:D=\"DAV:\">"));
        assert!(text.contains("<D:resourcetype/>"));
        assert!(text.contains("<D:getcontentlength/>"));
    }
}
