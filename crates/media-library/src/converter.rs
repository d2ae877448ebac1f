//! Converters
//!
//! A converter turns the original file of a media item into one derived file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::DynamicImage;
use media_core::config::ImageConversionConfig;
use thiserror::Error;

use crate::model::Media;

/// Errors raised by a converter itself
#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("{0}")]
    Failed(String),
}

pub type ConvertResult = Result<(), ConverterError>;

/// A named transformation from an input file to an output file
#[async_trait]
pub trait Converter: Send + Sync {
    /// Whether this converter applies to the given media
    fn can_convert(&self, _media: &Media) -> bool {
        true
    }

    /// Extension of the derived file; the original extension is used when `None`
    fn output_extension(&self, _media: &Media) -> Option<String> {
        None
    }

    /// Read `input` and write the derived file to `output`
    async fn convert(&self, media: &Media, input: &Path, output: &Path) -> ConvertResult;
}

type ImageTransform = dyn Fn(DynamicImage) -> DynamicImage + Send + Sync;

/// Adapter running an in-memory image transform as a [`Converter`]
///
/// Only image media is eligible. Decoding and encoding run on the blocking pool;
/// the output format follows the output file extension.
#[derive(Clone)]
pub struct ImageConverter {
    transform: Arc<ImageTransform>,
    format: Option<String>,
}

impl ImageConverter {
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(DynamicImage) -> DynamicImage + Send + Sync + 'static,
    {
        Self {
            transform: Arc::new(transform),
            format: None,
        }
    }

    /// Scale down to fit within the given bounds, keeping the aspect ratio
    pub fn thumbnail(width: u32, height: u32) -> Self {
        Self::new(move |image| image.thumbnail(width, height))
    }

    /// Build the converter for a configured preset
    pub fn from_config(config: &ImageConversionConfig) -> Self {
        let converter = Self::thumbnail(config.width, config.height);
        match &config.format {
            Some(format) => converter.with_format(format.clone()),
            None => converter,
        }
    }

    /// Encode the derived image with a different extension
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into().trim_start_matches('.').to_lowercase());
        self
    }
}

impl std::fmt::Debug for ImageConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageConverter")
            .field("format", &self.format)
            .finish()
    }
}

fn drops_alpha(output: &Path) -> bool {
    output
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false)
}

#[async_trait]
impl Converter for ImageConverter {
    fn can_convert(&self, media: &Media) -> bool {
        media.is_image()
    }

    fn output_extension(&self, _media: &Media) -> Option<String> {
        self.format.clone()
    }

    async fn convert(&self, _media: &Media, input: &Path, output: &Path) -> ConvertResult {
        let transform = Arc::clone(&self.transform);
        let input = input.to_path_buf();
        let output = output.to_path_buf();

        tokio::task::spawn_blocking(move || -> ConvertResult {
            // Decode by content; the input name may carry any extension
            let source = image::load_from_memory(&std::fs::read(&input)?)?;
            let converted = transform(source);
            let converted = if drops_alpha(&output) {
                DynamicImage::ImageRgb8(converted.to_rgb8())
            } else {
                converted
            };
            converted.save(&output)?;
            Ok(())
        })
        .await
        .map_err(|e| ConverterError::Failed(format!("image task aborted: {}", e)))?
    }
}
