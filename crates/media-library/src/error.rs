//! Media errors

use media_core::traits::Id;
use media_storage::StorageError;
use thiserror::Error;

use crate::converter::ConverterError;

/// Errors raised by registration, path resolution, conversion, and upload
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Conversion does not exist: {0}")]
    UnknownConversion(String),
    #[error("Conversion already registered: {0}")]
    DuplicateConversion(String),
    #[error("Failed to read source file {path}: {source}")]
    SourceReadFailed {
        path: String,
        #[source]
        source: StorageError,
    },
    #[error("Conversion {conversion} produced no readable output")]
    ConversionOutputMissing { conversion: String },
    #[error("Conversion {conversion} failed: {source}")]
    ConversionFailed {
        conversion: String,
        #[source]
        source: ConverterError,
    },
    #[error("Media not found: {0}")]
    NotFound(Id),
    #[error("Invalid file: {0}")]
    InvalidFile(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type MediaResult<T> = Result<T, MediaError>;
