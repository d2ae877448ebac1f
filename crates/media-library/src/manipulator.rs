//! Media Manipulator
//!
//! Generates derived files for a media item. The original is downloaded once into
//! a scratch file, every applicable converter runs against it, and each output is
//! streamed back to the media's disk next to the original.
//!
//! A failing converter aborts the remaining conversions of that call; outputs that
//! were already stored are kept. Scratch files are removed on every exit path,
//! including when the returned future is dropped mid-flight.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use media_storage::{DiskManager, Storage, StorageError, WriteOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::converter::Converter;
use crate::error::{MediaError, MediaResult};
use crate::model::Media;
use crate::path::{MediaPaths, PathGenerator};
use crate::registry::ConverterRegistry;

/// Process-local temporary file, deleted when dropped
#[derive(Debug)]
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(dir: &Path, extension: Option<&str>) -> Self {
        let file_name = match extension {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        Self {
            path: dir.join(file_name),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?self.path, error = %e, "Failed to remove scratch file"),
        }
    }
}

/// A conversion that passed eligibility and existence checks
struct PlannedConversion<'a> {
    name: &'a str,
    converter: Arc<dyn Converter>,
    destination: String,
}

/// Runs named conversions for media items
pub struct MediaManipulator {
    disks: Arc<DiskManager>,
    paths: MediaPaths,
    scratch_dir: PathBuf,
}

impl MediaManipulator {
    pub fn new(
        disks: Arc<DiskManager>,
        registry: Arc<ConverterRegistry>,
        generator: Arc<dyn PathGenerator>,
    ) -> Self {
        Self {
            disks,
            paths: MediaPaths::new(generator, registry),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Use a different directory for scratch files
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn paths(&self) -> &MediaPaths {
        &self.paths
    }

    /// Generate the named conversions for `media`
    ///
    /// Unknown names fail the call before any I/O. Converters that cannot handle
    /// the media are skipped, as are outputs that already exist when
    /// `only_if_missing` is set. Repeated names are converted once.
    #[instrument(skip(self, media), fields(media_id = media.id, disk = %media.disk))]
    pub async fn convert(
        &self,
        media: &Media,
        conversions: &[String],
        only_if_missing: bool,
    ) -> MediaResult<()> {
        let disk = self.disks.disk(&media.disk)?;

        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for name in conversions {
            if seen.insert(name.as_str()) {
                resolved.push((name.as_str(), self.paths.registry().get(name)?));
            }
        }

        let mut planned = Vec::with_capacity(resolved.len());
        for (name, converter) in resolved {
            if !converter.can_convert(media) {
                debug!(conversion = %name, "Converter does not apply to media, skipping");
                continue;
            }

            let destination = self.paths.conversion_path(media, name, converter.as_ref());
            if only_if_missing && disk.exists(&destination).await? {
                debug!(conversion = %name, path = %destination, "Conversion already exists, skipping");
                continue;
            }

            planned.push(PlannedConversion {
                name,
                converter,
                destination,
            });
        }

        if planned.is_empty() {
            return Ok(());
        }

        let input = ScratchFile::new(&self.scratch_dir, media.extension());
        self.download_source(disk.as_ref(), media, input.path()).await?;

        for conversion in &planned {
            self.perform(disk.as_ref(), media, input.path(), conversion)
                .await?;
            info!(
                conversion = %conversion.name,
                path = %conversion.destination,
                "Conversion stored"
            );
        }

        Ok(())
    }

    /// Copy the original from the disk into a local scratch file
    async fn download_source(
        &self,
        disk: &dyn Storage,
        media: &Media,
        target: &Path,
    ) -> MediaResult<()> {
        let source = self.paths.original_path(media);
        let read_failed = |e: StorageError| MediaError::SourceReadFailed {
            path: source.clone(),
            source: e,
        };

        let mut reader = disk.read_stream(&source).await.map_err(read_failed)?;
        let mut file = tokio::fs::File::create(target).await?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| read_failed(e.into()))?;
        file.flush().await?;

        debug!(path = %source, scratch = ?target, "Source downloaded");
        Ok(())
    }

    /// Run one converter and store its output at the planned destination
    async fn perform(
        &self,
        disk: &dyn Storage,
        media: &Media,
        input: &Path,
        conversion: &PlannedConversion<'_>,
    ) -> MediaResult<()> {
        let extension = conversion
            .converter
            .output_extension(media)
            .or_else(|| media.extension().map(str::to_string));
        let output = ScratchFile::new(&self.scratch_dir, extension.as_deref());

        conversion
            .converter
            .convert(media, input, output.path())
            .await
            .map_err(|source| MediaError::ConversionFailed {
                conversion: conversion.name.to_string(),
                source,
            })?;

        let missing = || MediaError::ConversionOutputMissing {
            conversion: conversion.name.to_string(),
        };
        let file = tokio::fs::File::open(output.path())
            .await
            .map_err(|_| missing())?;
        if !file.metadata().await.map_err(|_| missing())?.is_file() {
            return Err(missing());
        }

        disk.write_stream(&conversion.destination, Box::pin(file), WriteOptions::default())
            .await?;

        Ok(())
    }
}
