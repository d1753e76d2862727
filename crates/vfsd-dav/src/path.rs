//! Path and URI helpers.
//!
//! Paths handed to the backend are unescaped and absolute (`/docs/a b.txt`).
//! Everything that goes on the wire is escaped, keeping `/` as is.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Everything except RFC 3986 unreserved characters and `/` gets escaped.
const PATH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ESCAPE).to_string()
}

/// Unescapes a wire path.
///
/// Returns `None` when an escape would produce a `/` (it would change the
/// path structure) or the result is not UTF-8.
pub fn decode_path(path: &str) -> Option<String> {
    let bytes = path.as_bytes();
    for (i, window) in bytes.windows(3).enumerate() {
        if window[0] == b'%' && window[1] == b'2' && (window[2] | 0x20) == b'f' {
            log::debug!("refusing escaped slash at offset {} in {}", i, path);
            return None;
        }
    }
    percent_decode_str(path)
        .decode_utf8()
        .ok()
        .map(|p| p.into_owned())
}

fn trim_trailing_slashes(path: &str) -> &str {
    path.trim_end_matches('/')
}

/// Compares two paths, optionally ignoring trailing slashes.
pub fn path_equal(a: &str, b: &str, relax: bool) -> bool {
    if relax {
        trim_trailing_slashes(a) == trim_trailing_slashes(b)
    } else {
        a == b
    }
}

/// Compares two URIs; with `relax` a trailing slash on the path is ignored.
pub fn uri_equal(a: &Url, b: &Url, relax: bool) -> bool {
    a.scheme() == b.scheme()
        && a.host_str().map(str::to_ascii_lowercase) == b.host_str().map(str::to_ascii_lowercase)
        && a.port_or_known_default() == b.port_or_known_default()
        && a.query() == b.query()
        && path_equal(a.path(), b.path(), relax)
}

/// Parent directory of an (escaped or unescaped) path, keeping the trailing `/`.
///
/// The parent of `/` is `/`.
pub fn parent_dir(path: &str) -> String {
    let trimmed = trim_trailing_slashes(path);
    if trimmed.is_empty() {
        return "/".to_string();
    }
    match trimmed.rfind('/') {
        Some(pos) => trimmed[..=pos].to_string(),
        None => "/".to_string(),
    }
}

/// Last segment of a path; the root path is its own basename.
pub fn basename(path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return "/".to_string();
    }
    let path = path.trim_end_matches(|c: char| c == '/' || c.is_ascii_whitespace());
    match path.rfind('/') {
        Some(pos) => path[pos + 1..].to_string(),
        None => path.to_string(),
    }
}

/// Joins path elements with a single `/` between them.
///
/// Leading slashes of the first element and trailing slashes of the last
/// are kept, separators at the joints collapse into one.
pub fn build_path(elements: &[&str]) -> String {
    let parts: Vec<&str> = elements.iter().copied().filter(|e| !e.is_empty()).collect();
    let mut out = String::new();
    let last = parts.len().saturating_sub(1);
    for (i, part) in parts.iter().enumerate() {
        let mut piece = *part;
        if i > 0 {
            piece = piece.trim_start_matches('/');
            if !out.ends_with('/') {
                out.push('/');
            }
        }
        if i < last {
            piece = piece.trim_end_matches('/');
            if i == 0 && piece.is_empty() && part.starts_with('/') {
                piece = "/";
            }
        }
        out.push_str(piece);
    }
    out
}

/// URI of `path` below the mount base.
///
/// `/` denotes the base itself. Directories get a trailing slash.
pub fn uri_for_path(base: &Url, path: &str, is_dir: bool) -> Url {
    let mut uri = base.clone();
    if path == "/" {
        return uri;
    }
    let encoded = encode_path(path);
    let new_path = if is_dir {
        build_path(&[base.path(), &encoded, "/"])
    } else {
        build_path(&[base.path(), &encoded])
    };
    uri.set_path(&new_path);
    uri
}

/// Copy of `uri` with user and password removed, for headers and logs.
pub fn without_userinfo(uri: &Url) -> Url {
    let mut clean = uri.clone();
    // Both setters only fail for URIs that cannot carry credentials at all.
    let _ = clean.set_username("");
    let _ = clean.set_password(None);
    clean
}

/// Host without IPv6 brackets, as used for keyring keys and TLS names.
pub fn uri_host(uri: &Url) -> String {
    match uri.host() {
        Some(url::Host::Ipv6(addr)) => addr.to_string(),
        Some(host) => host.to_string(),
        None => String::new(),
    }
}
