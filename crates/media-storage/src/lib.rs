//! # media-storage
//!
//! Storage backends for Media RS.
//!
//! ## Features
//!
//! - Path-addressed storage abstraction with streaming reads and writes
//! - Local filesystem and in-memory backends
//! - Disk manager mapping disk identifiers to backends
//!
//! ## Example
//!
//! ```rust,ignore
//! use media_storage::{DiskManager, MemoryStorage, Storage};
//! use std::sync::Arc;
//!
//! let disks = DiskManager::new().with_disk("mem", Arc::new(MemoryStorage::new()));
//! let disk = disks.disk("mem")?;
//! disk.put("7/doc.bin", bytes::Bytes::from_static(b"data")).await?;
//! ```

pub mod disks;
pub mod storage;

pub use disks::DiskManager;
pub use storage::{
    stream_from_bytes, ByteStream, FileMetadata, LocalStorage, MemoryStorage, Storage,
    StorageError, StorageResult, Visibility, WriteOptions,
};
