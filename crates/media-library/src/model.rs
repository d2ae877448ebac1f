//! Media Model

use std::path::Path;

use chrono::{DateTime, Utc};
use media_core::traits::Id;
use serde::{Deserialize, Serialize};

/// A stored file plus its metadata
///
/// The storage path is never stored on the record; it is derived from the id and
/// file name by a [`PathGenerator`](crate::path::PathGenerator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Media ID
    pub id: Id,
    /// Display name
    pub name: String,
    /// Sanitised file name of the original
    pub file_name: String,
    /// MIME content type
    pub mime_type: String,
    /// File size in bytes
    pub size: u64,
    /// Disk holding the original and its derived files
    pub disk: String,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Media {
    pub fn new(
        id: Id,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
        disk: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size,
            disk: disk.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Extension of the original file, without the dot
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
    }

    /// File name without its extension
    pub fn base_name(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.file_name)
    }

    /// File name of a derived file, swapping in `extension` when given
    pub fn conversion_file_name(&self, extension: Option<&str>) -> String {
        match extension.or_else(|| self.extension()) {
            Some(ext) => format!("{}.{}", self.base_name(), ext),
            None => self.base_name().to_string(),
        }
    }

    /// Top-level MIME type, e.g. `image` for `image/png`
    pub fn media_type(&self) -> String {
        self.mime_type
            .split('/')
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    /// Check the top-level MIME type, ignoring case
    pub fn is_of_type(&self, media_type: &str) -> bool {
        self.media_type().eq_ignore_ascii_case(media_type)
    }

    /// Check the full MIME type against a list, ignoring case
    pub fn is_of_sub_type(&self, sub_types: &[&str]) -> bool {
        sub_types
            .iter()
            .any(|sub_type| self.mime_type.eq_ignore_ascii_case(sub_type))
    }

    /// Check if this is an image
    pub fn is_image(&self) -> bool {
        self.is_of_type("image")
    }
}

/// Attributes of a media record that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMedia {
    pub name: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub disk: String,
}
