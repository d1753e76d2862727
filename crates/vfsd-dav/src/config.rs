//! Process-wide settings for the WebDAV backend.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors while loading a [`DavConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML or has wrong field types.
    #[error("toml parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value parsed but makes no sense.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// HTTP client settings shared by every mount in the process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DavConfig {
    /// Idle connections kept per host.
    pub pool_size: usize,
    /// Redirect hops followed for one logical request.
    pub max_redirects: usize,
    /// Connect timeout in seconds.
    pub connect_timeout: u64,
    /// Seconds an idle pooled connection is kept open.
    pub pool_idle_timeout: u64,
    pub user_agent: String,
}

impl Default for DavConfig {
    fn default() -> Self {
        Self {
            pool_size: 16,
            max_redirects: 16,
            connect_timeout: 30,
            pool_idle_timeout: 90,
            user_agent: format!("vfsd-dav/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl DavConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: DavConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads settings from a file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".to_string()));
        }
        if self.max_redirects == 0 {
            return Err(ConfigError::Invalid(
                "max_redirects must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
