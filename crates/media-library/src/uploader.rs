//! Media Uploader
//!
//! Creates media records from uploaded files and removes them again together with
//! every derived file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use media_storage::{
    stream_from_bytes, ByteStream, DiskManager, Storage, Visibility, WriteOptions,
};
use tracing::{info, instrument, warn};

use crate::error::{MediaError, MediaResult};
use crate::model::{Media, NewMedia};
use crate::path::MediaPaths;
use crate::store::MediaStore;

/// Custom file name sanitiser
pub type Sanitiser = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Replace characters that are unsafe in storage keys
pub fn sanitise_file_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| match c {
            '#' | '/' | '\\' | ' ' => '-',
            c => c,
        })
        .collect()
}

/// File to upload
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// A file on the local filesystem
    Path(PathBuf),
    /// In-memory contents with the client's file name
    Bytes { file_name: String, data: Bytes },
}

impl UploadSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn bytes(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::Bytes {
            file_name: file_name.into(),
            data: data.into(),
        }
    }

    fn file_name(&self) -> MediaResult<String> {
        match self {
            Self::Path(path) => path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
                .ok_or_else(|| MediaError::InvalidFile(path.display().to_string())),
            Self::Bytes { file_name, .. } => Ok(file_name.clone()),
        }
    }
}

/// Upload options
#[derive(Clone, Default)]
pub struct UploadOptions {
    pub media_name: Option<String>,
    pub file_name: Option<String>,
    pub sanitiser: Option<Sanitiser>,
    pub disk: Option<String>,
    pub visibility: Option<String>,
    pub preserve_original: bool,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn media_name(mut self, name: impl Into<String>) -> Self {
        self.media_name = Some(name.into());
        self
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn sanitise_with<F>(mut self, sanitiser: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.sanitiser = Some(Arc::new(sanitiser));
        self
    }

    pub fn disk(mut self, disk: impl Into<String>) -> Self {
        self.disk = Some(disk.into());
        self
    }

    pub fn visibility(mut self, visibility: impl Into<String>) -> Self {
        self.visibility = Some(visibility.into());
        self
    }

    pub fn preserve_original(mut self) -> Self {
        self.preserve_original = true;
        self
    }
}

impl std::fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOptions")
            .field("media_name", &self.media_name)
            .field("file_name", &self.file_name)
            .field("sanitiser", &self.sanitiser.is_some())
            .field("disk", &self.disk)
            .field("visibility", &self.visibility)
            .field("preserve_original", &self.preserve_original)
            .finish()
    }
}

/// Uploads and deletes media
pub struct MediaUploader {
    store: Arc<dyn MediaStore>,
    disks: Arc<DiskManager>,
    paths: MediaPaths,
    default_disk: String,
}

impl MediaUploader {
    pub fn new(
        store: Arc<dyn MediaStore>,
        disks: Arc<DiskManager>,
        paths: MediaPaths,
        default_disk: impl Into<String>,
    ) -> Self {
        Self {
            store,
            disks,
            paths,
            default_disk: default_disk.into(),
        }
    }

    /// Store a file and create its media record
    ///
    /// The record is removed again when the file cannot be written.
    #[instrument(skip(self, source, options))]
    pub async fn upload(&self, source: UploadSource, options: UploadOptions) -> MediaResult<Media> {
        let visibility = match options.visibility.as_deref() {
            None => None,
            Some(value) => Some(Visibility::from_str(value).ok_or_else(|| {
                MediaError::InvalidFile(format!("unsupported visibility: {}", value))
            })?),
        };

        let disk_name = options
            .disk
            .clone()
            .unwrap_or_else(|| self.default_disk.clone());
        let disk = self.disks.disk(&disk_name)?;

        let client_name = match &options.file_name {
            Some(name) => name.clone(),
            None => source.file_name()?,
        };
        let file_name = match &options.sanitiser {
            Some(sanitise) => sanitise(&client_name),
            None => sanitise_file_name(&client_name),
        };
        if file_name.is_empty() {
            return Err(MediaError::InvalidFile("empty file name".to_string()));
        }

        let name = options.media_name.clone().unwrap_or_else(|| {
            Path::new(&client_name)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(&client_name)
                .to_string()
        });
        let mime_type = mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .to_string();

        let (reader, size) = open_source(&source).await?;

        let media = self
            .store
            .create(NewMedia {
                name,
                file_name,
                mime_type: mime_type.clone(),
                size,
                disk: disk_name,
            })
            .await?;

        let mut write_options = WriteOptions::default().content_type(mime_type);
        if let Some(visibility) = visibility {
            write_options = write_options.visibility(visibility);
        }

        let path = self.paths.original_path(&media);
        if let Err(e) = disk.write_stream(&path, reader, write_options).await {
            warn!(media_id = media.id, path = %path, error = %e, "Upload failed, removing record");
            self.store.delete(media.id).await?;
            return Err(e.into());
        }

        if let UploadSource::Path(local) = &source {
            if !options.preserve_original {
                tokio::fs::remove_file(local).await?;
            }
        }

        info!(media_id = media.id, path = %path, size = media.size, "Media uploaded");
        Ok(media)
    }

    /// Delete every derived file, the original, and the record
    #[instrument(skip(self, media), fields(media_id = media.id))]
    pub async fn delete(&self, media: &Media) -> MediaResult<()> {
        let disk = self.disks.disk(&media.disk)?;

        for (name, converter) in self.paths.registry().all() {
            let path = self.paths.conversion_path(media, &name, converter.as_ref());
            disk.delete(&path).await?;
        }
        disk.delete(&self.paths.original_path(media)).await?;

        self.store.delete(media.id).await?;

        info!(file_name = %media.file_name, "Media deleted");
        Ok(())
    }
}

async fn open_source(source: &UploadSource) -> MediaResult<(ByteStream, u64)> {
    match source {
        UploadSource::Path(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| MediaError::InvalidFile(format!("{}: {}", path.display(), e)))?;
            let metadata = file.metadata().await?;
            if !metadata.is_file() {
                return Err(MediaError::InvalidFile(path.display().to_string()));
            }
            Ok((Box::pin(file), metadata.len()))
        }
        UploadSource::Bytes { data, .. } => Ok((stream_from_bytes(data.clone()), data.len() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;
    use media_storage::MemoryStorage;

    use super::*;
    use crate::converter::{ConvertResult, Converter};
    use crate::path::DefaultPathGenerator;
    use crate::registry::ConverterRegistry;
    use crate::store::MemoryMediaStore;

    struct TextConverter;

    #[async_trait]
    impl Converter for TextConverter {
        fn output_extension(&self, _media: &Media) -> Option<String> {
            Some("txt".to_string())
        }

        async fn convert(&self, _media: &Media, _input: &Path, _output: &Path) -> ConvertResult {
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryMediaStore>,
        storage: Arc<MemoryStorage>,
        uploader: MediaUploader,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryMediaStore::new());
        let storage = Arc::new(MemoryStorage::with_base_url("/media"));
        let disks = DiskManager::new().with_disk("public", storage.clone());

        let mut registry = ConverterRegistry::new();
        registry.register("upper", TextConverter).unwrap();
        let paths = MediaPaths::new(Arc::new(DefaultPathGenerator), Arc::new(registry));

        let uploader = MediaUploader::new(store.clone(), Arc::new(disks), paths, "public");
        Fixture {
            store,
            storage,
            uploader,
        }
    }

    #[test]
    fn test_sanitise_file_name() {
        assert_eq!(sanitise_file_name("my file#1.png"), "my-file-1.png");
        assert_eq!(sanitise_file_name("a/b\\c.txt"), "a-b-c.txt");
        assert_eq!(sanitise_file_name("plain.txt"), "plain.txt");
    }

    #[tokio::test]
    async fn test_upload_bytes() {
        let f = fixture();

        let media = f
            .uploader
            .upload(
                UploadSource::bytes("holiday photo.png", &b"pixels"[..]),
                UploadOptions::new(),
            )
            .await
            .unwrap();

        assert_eq!(media.id, 1);
        assert_eq!(media.name, "holiday photo");
        assert_eq!(media.file_name, "holiday-photo.png");
        assert_eq!(media.mime_type, "image/png");
        assert_eq!(media.size, 6);
        assert_eq!(media.disk, "public");
        assert_eq!(
            f.storage.get("1/holiday-photo.png").await.unwrap(),
            Bytes::from_static(b"pixels")
        );
        assert!(f.store.get(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upload_options() {
        let f = fixture();

        let media = f
            .uploader
            .upload(
                UploadSource::bytes("ignored.bin", &b"data"[..]),
                UploadOptions::new()
                    .media_name("Report")
                    .file_name("Q1 report.txt")
                    .sanitise_with(|name| name.to_lowercase().replace(' ', "_"))
                    .visibility("private"),
            )
            .await
            .unwrap();

        assert_eq!(media.name, "Report");
        assert_eq!(media.file_name, "q1_report.txt");
        assert_eq!(media.mime_type, "text/plain");

        let metadata = f.storage.metadata("1/q1_report.txt").await.unwrap();
        assert_eq!(metadata.visibility, Some(Visibility::Private));
    }

    #[tokio::test]
    async fn test_upload_rejects_unknown_visibility() {
        let f = fixture();

        let result = f
            .uploader
            .upload(
                UploadSource::bytes("a.txt", &b"a"[..]),
                UploadOptions::new().visibility("secret"),
            )
            .await;

        assert!(matches!(result, Err(MediaError::InvalidFile(_))));
        assert!(f.store.get(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upload_unknown_disk() {
        let f = fixture();

        let result = f
            .uploader
            .upload(
                UploadSource::bytes("a.txt", &b"a"[..]),
                UploadOptions::new().disk("s3"),
            )
            .await;

        assert!(matches!(result, Err(MediaError::Storage(_))));
    }

    #[tokio::test]
    async fn test_upload_path_removes_source() {
        let f = fixture();
        let dir = tempfile::tempdir().unwrap();

        let kept = dir.path().join("kept.txt");
        let moved = dir.path().join("moved.txt");
        std::fs::write(&kept, b"keep me").unwrap();
        std::fs::write(&moved, b"move me").unwrap();

        f.uploader
            .upload(
                UploadSource::path(&kept),
                UploadOptions::new().preserve_original(),
            )
            .await
            .unwrap();
        let media = f
            .uploader
            .upload(UploadSource::path(&moved), UploadOptions::new())
            .await
            .unwrap();

        assert!(kept.exists());
        assert!(!moved.exists());
        assert_eq!(media.size, 7);
        assert_eq!(
            f.storage.get("2/moved.txt").await.unwrap(),
            Bytes::from_static(b"move me")
        );
    }

    #[tokio::test]
    async fn test_upload_missing_path() {
        let f = fixture();

        let result = f
            .uploader
            .upload(
                UploadSource::path("/nonexistent/missing.txt"),
                UploadOptions::new(),
            )
            .await;

        assert!(matches!(result, Err(MediaError::InvalidFile(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_derived_files() {
        let f = fixture();
        let media = f
            .uploader
            .upload(UploadSource::bytes("doc.bin", &b"x"[..]), UploadOptions::new())
            .await
            .unwrap();
        f.storage
            .put("1/upper/doc.txt", Bytes::from_static(b"X"))
            .await
            .unwrap();

        f.uploader.delete(&media).await.unwrap();

        assert!(f.storage.keys().await.is_empty());
        assert!(f.store.get(media.id).await.unwrap().is_none());
    }
}
