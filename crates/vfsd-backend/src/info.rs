//! File and filesystem metadata returned by backend verbs.

use chrono::{DateTime, Utc};

/// Kind of a resource as far as the file manager is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    /// Server reported a resource type we do not recognize.
    #[default]
    Unknown,
    Regular,
    Directory,
    /// Redirect reference (a server side shortcut).
    SymbolicLink,
}

/// Metadata of a single resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub edit_name: String,
    pub display_name: String,
    pub file_type: FileType,
    /// `None` for directories and whenever the server sent no length.
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub is_hidden: bool,
    pub can_trash: bool,
    /// Themed icon names, most specific first.
    pub icon: Vec<String>,
    pub symbolic_icon: Vec<String>,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }
}

/// Filesystem level information for a mount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsInfo {
    pub fs_type: String,
    pub remote: bool,
    pub size: Option<u64>,
    pub free: Option<u64>,
    pub used: Option<u64>,
}

/// Selects which attributes a caller wants, e.g. `"standard::*,filesystem::free"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMatcher {
    patterns: Vec<String>,
}

impl AttributeMatcher {
    pub fn new(spec: &str) -> Self {
        let patterns = spec
            .split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        Self { patterns }
    }

    /// Matcher that accepts every attribute.
    pub fn all() -> Self {
        Self::new("*")
    }

    pub fn matches(&self, attribute: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            if pattern == "*" || pattern == attribute {
                return true;
            }
            match pattern.strip_suffix("::*") {
                Some(ns) => attribute
                    .strip_prefix(ns)
                    .is_some_and(|rest| rest.starts_with("::")),
                None => false,
            }
        })
    }

    pub fn matches_any(&self, attributes: &[&str]) -> bool {
        attributes.iter().any(|a| self.matches(a))
    }
}
