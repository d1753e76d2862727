//! Content type guessing and icon names.
//!
//! PROPFIND responses carry no body bytes, so the only input is the name.

use std::path::Path;

pub const DIRECTORY_TYPE: &str = "inode/directory";
pub const UNKNOWN_TYPE: &str = "application/octet-stream";

pub fn guess_content_type(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|v| v.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "txt" | "text" | "log" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "odt" => "application/vnd.oasis.opendocument.text",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "md" => "text/markdown",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        _ => UNKNOWN_TYPE,
    }
}

/// Strips `;` parameters and surrounding whitespace from a content type.
///
/// Returns `None` for values that carry no information, so the caller can
/// fall back to guessing.
pub fn normalize_content_type(value: &str) -> Option<String> {
    let base = value.split(';').next().unwrap_or("").trim();
    if base.is_empty() || base.eq_ignore_ascii_case(UNKNOWN_TYPE) {
        None
    } else {
        Some(base.to_string())
    }
}

/// Themed icon names for a content type, most specific first.
pub fn icon_names(content_type: &str, symbolic: bool) -> Vec<String> {
    let suffix = if symbolic { "-symbolic" } else { "" };
    if content_type == DIRECTORY_TYPE {
        return vec![format!("folder{}", suffix)];
    }
    let mut names = vec![format!("{}{}", content_type.replace('/', "-"), suffix)];
    if let Some((media, _)) = content_type.split_once('/') {
        names.push(format!("{}-x-generic{}", media, suffix));
    }
    let fallback = format!("text-x-generic{}", suffix);
    if !names.contains(&fallback) {
        names.push(fallback);
    }
    names
}
