//! Mount type to backend constructor table.

use crate::backend::Backend;
use crate::error::{Result, VfsError};
use crate::spec::MountSpec;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a fresh, unmounted backend.
pub type BackendFactory = Arc<dyn Fn() -> Arc<dyn Backend> + Send + Sync>;

#[derive(Default, Clone)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mount_type: &str, factory: BackendFactory) {
        debug!("registering backend for mount type {}", mount_type);
        self.factories.insert(mount_type.to_string(), factory);
    }

    pub fn contains(&self, mount_type: &str) -> bool {
        self.factories.contains_key(mount_type)
    }

    /// Sorted list of registered mount types.
    pub fn mount_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Creates the backend that handles `spec`'s mount type.
    pub fn create(&self, spec: &MountSpec) -> Result<Arc<dyn Backend>> {
        let mount_type = spec
            .mount_type()
            .ok_or_else(|| VfsError::InvalidArgument("Invalid mount spec".to_string()))?;
        let factory = self.factories.get(mount_type).ok_or_else(|| {
            VfsError::NotSupported(format!("No backend for mount type {}", mount_type))
        })?;
        Ok(factory())
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("mount_types", &self.mount_types())
            .finish()
    }
}
