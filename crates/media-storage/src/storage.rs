//! Storage Abstraction
//!
//! Provides a unified, path-addressed interface for file storage backends.

use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Unknown disk: {0}")]
    UnknownDisk(String),
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Readable byte stream handed out by and to backends
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Wrap an in-memory buffer as a [`ByteStream`]
pub fn stream_from_bytes(data: impl Into<Bytes>) -> ByteStream {
    Box::pin(Cursor::new(data.into()))
}

/// File visibility on backends that support it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

/// Options accepted by [`Storage::write_stream`]
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub visibility: Option<Visibility>,
    /// Overrides the content type guessed from the key
    pub content_type: Option<String>,
}

impl WriteOptions {
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// File metadata from storage
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    /// Content type (MIME)
    pub content_type: String,
    /// SHA256 digest
    pub digest: String,
    /// Visibility recorded at write time, if the backend tracks it
    pub visibility: Option<Visibility>,
    /// Last modified time
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// Storage trait - unified interface for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Open a stream over the file at `key`
    async fn read_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Write the whole stream to `key`, replacing any existing file
    async fn write_stream(
        &self,
        key: &str,
        reader: ByteStream,
        options: WriteOptions,
    ) -> StorageResult<FileMetadata>;

    /// Store data with a key
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<FileMetadata> {
        self.write_stream(key, stream_from_bytes(data), WriteOptions::default())
            .await
    }

    /// Retrieve data by key
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let mut reader = self.read_stream(key).await?;
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        Ok(Bytes::from(buffer))
    }

    /// Delete data by key; missing keys are not an error
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get file metadata
    async fn metadata(&self, key: &str) -> StorageResult<FileMetadata>;

    /// Public URL for a key
    fn url(&self, key: &str) -> String;

    /// Local filesystem path for a key, when the backend has one
    fn local_path(&self, _key: &str) -> Option<PathBuf> {
        None
    }

    /// Get storage name for logging
    fn name(&self) -> &str;
}

fn guess_content_type(key: &str) -> String {
    mime_guess::from_path(key)
        .first_or_octet_stream()
        .to_string()
}

fn join_url(base_url: &str, key: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), key)
}

/// Local filesystem storage
pub struct LocalStorage {
    /// Root directory for storage
    root: PathBuf,
    /// Base URL for generating URLs
    base_url: String,
}

impl LocalStorage {
    /// Create a new local storage
    pub fn new(root: impl AsRef<Path>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            base_url: base_url.into(),
        }
    }

    /// Resolve a key to a full path
    fn resolve_path(&self, key: &str) -> StorageResult<PathBuf> {
        // Prevent directory traversal; dots inside a file name are fine
        let escapes = Path::new(key).components().any(|c| {
            matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        });
        if key.is_empty() || escapes || key.starts_with('\\') {
            return Err(StorageError::InvalidPath(key.to_string()));
        }

        Ok(self.root.join(key))
    }

    /// Ensure parent directory exists
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Stream `reader` into `path`, returning the byte count and SHA256 digest
    async fn copy_hashed(mut reader: ByteStream, path: &Path) -> StorageResult<(u64, String)> {
        let mut file = fs::File::create(path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];
        let mut size = 0u64;

        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            file.write_all(&buffer[..read]).await?;
            size += read as u64;
        }

        file.sync_all().await?;
        Ok((size, hex::encode(hasher.finalize())))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    #[instrument(skip(self), fields(storage = "local"))]
    async fn read_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let path = self.resolve_path(key)?;

        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, reader, options), fields(storage = "local"))]
    async fn write_stream(
        &self,
        key: &str,
        reader: ByteStream,
        options: WriteOptions,
    ) -> StorageResult<FileMetadata> {
        let path = self.resolve_path(key)?;
        self.ensure_parent(&path).await?;

        // Readers only ever see a complete file: write aside, then rename over
        let partial = path.with_file_name(format!(
            ".{}.{}.part",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
            Uuid::new_v4()
        ));

        let (size, digest) = match Self::copy_hashed(reader, &partial).await {
            Ok(result) => result,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&partial).await {
                    warn!(path = ?partial, error = %cleanup, "Failed to remove partial file");
                }
                return Err(e);
            }
        };
        fs::rename(&partial, &path).await?;

        debug!(path = ?path, size = size, "File stored");

        Ok(FileMetadata {
            size,
            content_type: options
                .content_type
                .unwrap_or_else(|| guess_content_type(key)),
            digest,
            visibility: options.visibility,
            last_modified: Some(chrono::Utc::now()),
        })
    }

    #[instrument(skip(self), fields(storage = "local"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve_path(key)?;

        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
            debug!(path = ?path, "File deleted");
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn metadata(&self, key: &str) -> StorageResult<FileMetadata> {
        let path = self.resolve_path(key)?;

        if !fs::try_exists(&path).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let meta = fs::metadata(&path).await?;
        let data = self.get(key).await?;
        let digest = hex::encode(Sha256::digest(&data));

        Ok(FileMetadata {
            size: meta.len(),
            content_type: guess_content_type(key),
            digest,
            visibility: None,
            last_modified: meta.modified().ok().map(chrono::DateTime::from),
        })
    }

    fn url(&self, key: &str) -> String {
        join_url(&self.base_url, key)
    }

    fn local_path(&self, key: &str) -> Option<PathBuf> {
        self.resolve_path(key).ok()
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// In-memory storage for testing
pub struct MemoryStorage {
    files: tokio::sync::RwLock<std::collections::HashMap<String, (Bytes, FileMetadata)>>,
    base_url: String,
    writes: AtomicUsize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_base_url("/memory")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            files: tokio::sync::RwLock::new(std::collections::HashMap::new()),
            base_url: base_url.into(),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of completed writes since creation
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// All stored keys, sorted
    pub async fn keys(&self) -> Vec<String> {
        let files = self.files.read().await;
        let mut keys: Vec<String> = files.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let files = self.files.read().await;
        files
            .get(key)
            .map(|(data, _)| stream_from_bytes(data.clone()))
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn write_stream(
        &self,
        key: &str,
        mut reader: ByteStream,
        options: WriteOptions,
    ) -> StorageResult<FileMetadata> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await?;
        let data = Bytes::from(buffer);

        let metadata = FileMetadata {
            size: data.len() as u64,
            content_type: options
                .content_type
                .unwrap_or_else(|| guess_content_type(key)),
            digest: hex::encode(Sha256::digest(&data)),
            visibility: options.visibility,
            last_modified: Some(chrono::Utc::now()),
        };

        let mut files = self.files.write().await;
        files.insert(key.to_string(), (data, metadata.clone()));
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(metadata)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut files = self.files.write().await;
        files.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let files = self.files.read().await;
        Ok(files.contains_key(key))
    }

    async fn metadata(&self, key: &str) -> StorageResult<FileMetadata> {
        let files = self.files.read().await;
        files
            .get(key)
            .map(|(_, meta)| meta.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn url(&self, key: &str) -> String {
        join_url(&self.base_url, key)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
