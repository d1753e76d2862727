//! Mount specifications.
//!
//! A mount spec is the flat, string keyed description of a mount that the
//! daemon registers and hands back to backends. Hosts that are IPv6 literals
//! are kept bracketed here (`[::1]`); helpers convert at the boundary.

use std::collections::BTreeMap;
use std::fmt;

/// Flat key/value description of a mount plus its path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MountSpec {
    items: BTreeMap<String, String>,
    prefix: String,
}

impl MountSpec {
    /// Creates an empty spec of the given mount type.
    pub fn new(mount_type: &str) -> Self {
        let mut spec = Self {
            items: BTreeMap::new(),
            prefix: "/".to_string(),
        };
        spec.set("type", mount_type);
        spec
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.items.insert(key.to_string(), value.into());
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.items.remove(key)
    }

    pub fn mount_type(&self) -> Option<&str> {
        self.get("type")
    }

    /// Unescaped path prefix of the mount, always starting with `/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn set_prefix(&mut self, prefix: &str) {
        self.prefix = if prefix.starts_with('/') {
            prefix.to_string()
        } else {
            format!("/{}", prefix)
        };
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.set_prefix(prefix);
        self
    }

    /// Host as used on the wire: IPv6 brackets removed.
    pub fn host_unbracketed(&self) -> Option<&str> {
        self.get("host").map(strip_brackets)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for MountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        write!(f, " prefix={}", self.prefix)
    }
}

/// Removes the brackets around an IPv6 literal, leaves anything else alone.
pub fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Brackets a bare IPv6 literal so it can be stored in a spec or URI.
pub fn bracket_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv6_brackets() {
        assert_eq!(strip_brackets("[fe80::1]"), "fe80::1");
        assert_eq!(strip_brackets("example.com"), "example.com");
        assert_eq!(bracket_host("fe80::1"), "[fe80::1]");
        assert_eq!(bracket_host("[fe80::1]"), "[fe80::1]");
        assert_eq!(bracket_host("example.com"), "example.com");
    }

    #[test]
    fn test_spec_prefix_and_host() {
        let spec = MountSpec::new("dav")
            .with("host", "[::1]")
            .with_prefix("share");
        assert_eq!(spec.mount_type(), Some("dav"));
        assert_eq!(spec.prefix(), "/share");
        assert_eq!(spec.host_unbracketed(), Some("::1"));
    }
}
