//! # media-library
//!
//! Media model and conversion pipeline for Media RS.
//!
//! ## Features
//!
//! - Media records with path and URL derivation
//! - Named converter registry (general file converters and image adapters)
//! - Swappable path generation for originals and derived files
//! - Conversion pipeline with scratch-file handling and idempotent re-runs
//! - Media groups declaring conversions per attachment group
//! - Uploading and deleting media together with its derived files
//!
//! ## Example
//!
//! ```rust,ignore
//! use media_library::{ConverterRegistry, DefaultPathGenerator, ImageConverter, MediaManipulator};
//! use std::sync::Arc;
//!
//! let mut registry = ConverterRegistry::new();
//! registry.register("thumb", ImageConverter::thumbnail(150, 150).with_format("jpg"))?;
//!
//! let manipulator = MediaManipulator::new(
//!     Arc::new(disks),
//!     Arc::new(registry),
//!     Arc::new(DefaultPathGenerator),
//! );
//! manipulator.convert(&media, &["thumb".to_string()], true).await?;
//! ```

pub mod converter;
pub mod error;
pub mod group;
pub mod manipulator;
pub mod model;
pub mod path;
pub mod registry;
pub mod store;
pub mod uploader;

pub use converter::{ConvertResult, Converter, ConverterError, ImageConverter};
pub use error::{MediaError, MediaResult};
pub use group::{MediaGroup, MediaGroups, RegistersMediaGroups};
pub use manipulator::MediaManipulator;
pub use model::{Media, NewMedia};
pub use path::{DefaultPathGenerator, MediaPaths, PathGenerator};
pub use registry::ConverterRegistry;
pub use store::{MediaStore, MemoryMediaStore};
pub use uploader::{sanitise_file_name, MediaUploader, UploadOptions, UploadSource};
