//! Attachment errors

use media_core::traits::Id;
use media_jobs::JobError;
use media_library::MediaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("Media does not exist: {0}")]
    InvalidMediaReference(Id),
    #[error("Conversion dispatch failed: {0}")]
    Dispatch(#[from] JobError),
    #[error(transparent)]
    Media(#[from] MediaError),
}

pub type AttachResult<T> = Result<T, AttachError>;
