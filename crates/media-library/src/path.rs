//! Path Generation
//!
//! Maps a media item, and optionally a conversion, to a storage key. Keys are part
//! of the storage contract: changing the layout orphans previously derived files.

use std::sync::Arc;

use media_storage::DiskManager;

use crate::converter::Converter;
use crate::error::MediaResult;
use crate::model::Media;
use crate::registry::ConverterRegistry;

/// Storage layout strategy
///
/// Implementations must be pure: the same inputs always yield the same key, and no
/// I/O is performed.
pub trait PathGenerator: Send + Sync {
    /// Key of the original file
    fn path(&self, media: &Media) -> String;

    /// Key of a derived file; `extension` replaces the original extension when set
    fn conversion_path(&self, media: &Media, conversion: &str, extension: Option<&str>) -> String;
}

/// `{id}/{file_name}` for originals, `{id}/{conversion}/{base}.{ext}` for derived files
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPathGenerator;

impl DefaultPathGenerator {
    fn base_path(media: &Media) -> String {
        media.id.to_string()
    }
}

impl PathGenerator for DefaultPathGenerator {
    fn path(&self, media: &Media) -> String {
        format!("{}/{}", Self::base_path(media), media.file_name)
    }

    fn conversion_path(&self, media: &Media, conversion: &str, extension: Option<&str>) -> String {
        format!(
            "{}/{}/{}",
            Self::base_path(media),
            conversion,
            media.conversion_file_name(extension)
        )
    }
}

/// Path generator bound to the converter registry
///
/// Resolves each converter's output extension so callers only deal in names.
#[derive(Clone)]
pub struct MediaPaths {
    generator: Arc<dyn PathGenerator>,
    registry: Arc<ConverterRegistry>,
}

impl MediaPaths {
    pub fn new(generator: Arc<dyn PathGenerator>, registry: Arc<ConverterRegistry>) -> Self {
        Self {
            generator,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ConverterRegistry> {
        &self.registry
    }

    /// Key of the original, or of a derived file when a non-empty conversion is given
    pub fn path(&self, media: &Media, conversion: Option<&str>) -> MediaResult<String> {
        match conversion.filter(|name| !name.is_empty()) {
            Some(name) => {
                let converter = self.registry.get(name)?;
                Ok(self.conversion_path(media, name, converter.as_ref()))
            }
            None => Ok(self.original_path(media)),
        }
    }

    pub fn original_path(&self, media: &Media) -> String {
        self.generator.path(media)
    }

    /// Key of a derived file for an already resolved converter
    pub fn conversion_path(&self, media: &Media, name: &str, converter: &dyn Converter) -> String {
        let extension = converter.output_extension(media);
        self.generator
            .conversion_path(media, name, extension.as_deref())
    }

    /// Public URL of the original or of a derived file
    pub fn url(
        &self,
        disks: &DiskManager,
        media: &Media,
        conversion: Option<&str>,
    ) -> MediaResult<String> {
        let path = self.path(media, conversion)?;
        Ok(disks.disk(&media.disk)?.url(&path))
    }
}

impl std::fmt::Debug for MediaPaths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPaths")
            .field("registry", &self.registry)
            .finish()
    }
}
