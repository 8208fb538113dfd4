//! crates/streamfox_core/src/error.rs
//!
//! The error taxonomy of the video lifecycle. User errors are the caller's to
//! fix; everything else is a server fault.

use std::time::Duration;

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("Invalid video identifier")]
    InvalidId,
    #[error("Video not found")]
    NotFound,
    #[error("Video is owned by another user")]
    NotOwner,
    #[error("Video upload is not complete")]
    UploadIncomplete,
    #[error("Video has already been uploaded and cannot be overwritten")]
    CannotOverwrite,
    #[error("Another upload of this video is in progress")]
    UploadInProgress,
    #[error("Unsupported or corrupt video format")]
    InvalidFormat,
    #[error("Invalid video settings: {0}")]
    InvalidSettings(String),

    #[error("File I/O failure: {0}")]
    FileIo(#[source] std::io::Error),
    #[error("Media probe failed: {0}")]
    Probe(String),
    #[error("Thumbnail generation failed: {0}")]
    Thumbnail(String),
    #[error("{step} timed out after {after:?}")]
    Timeout { step: &'static str, after: Duration },
    #[error("Persistence failure: {0}")]
    Persistence(PortError),
}

impl VideoError {
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            VideoError::InvalidId
                | VideoError::NotFound
                | VideoError::NotOwner
                | VideoError::UploadIncomplete
                | VideoError::CannotOverwrite
                | VideoError::UploadInProgress
                | VideoError::InvalidFormat
                | VideoError::InvalidSettings(_)
        )
    }
}

impl From<PortError> for VideoError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(_) => VideoError::NotFound,
            other => VideoError::Persistence(other),
        }
    }
}
