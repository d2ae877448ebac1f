//! Disk Manager
//!
//! Resolves disk identifiers to storage backends.

use std::collections::HashMap;
use std::sync::Arc;

use media_core::config::{DiskDriver, MediaConfig};
use tracing::info;

use crate::storage::{LocalStorage, MemoryStorage, Storage, StorageError, StorageResult};

/// Named storage backends, built once at startup and shared read-only
#[derive(Clone, Default)]
pub struct DiskManager {
    disks: HashMap<String, Arc<dyn Storage>>,
}

impl DiskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every disk declared in the configuration
    pub fn from_config(config: &MediaConfig) -> StorageResult<Self> {
        let mut manager = Self::new();

        for disk in &config.storage.disks {
            let storage: Arc<dyn Storage> = match disk.driver {
                DiskDriver::Local => {
                    let root = disk.root.as_ref().ok_or_else(|| {
                        StorageError::InvalidPath(format!("disk {} has no root", disk.name))
                    })?;
                    Arc::new(LocalStorage::new(root, disk.base_url.clone()))
                }
                DiskDriver::Memory => Arc::new(MemoryStorage::with_base_url(disk.base_url.clone())),
            };

            info!(disk = %disk.name, driver = ?disk.driver, "Disk configured");
            manager.register(disk.name.clone(), storage);
        }

        Ok(manager)
    }

    /// Add or replace a disk
    pub fn register(&mut self, name: impl Into<String>, storage: Arc<dyn Storage>) {
        self.disks.insert(name.into(), storage);
    }

    pub fn with_disk(mut self, name: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        self.register(name, storage);
        self
    }

    /// Backend for a disk identifier
    pub fn disk(&self, name: &str) -> StorageResult<Arc<dyn Storage>> {
        self.disks
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::UnknownDisk(name.to_string()))
    }

    pub fn has_disk(&self, name: &str) -> bool {
        self.disks.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.disks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for DiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskManager")
            .field("disks", &self.names())
            .finish()
    }
}
