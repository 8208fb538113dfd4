//! services/api/src/web/errors.rs
//!
//! Turns core errors into HTTP responses. User errors carry their message;
//! server errors are logged in full and answered with a generic message, so
//! storage paths and tool output never reach the client.

use axum::http::StatusCode;
use streamfox_core::{PortError, VideoError};
use tracing::error;
use uuid::Uuid;

pub type HandlerError = (StatusCode, String);

pub fn parse_video_id(raw: &str) -> Result<Uuid, VideoError> {
    Uuid::parse_str(raw).map_err(|_| VideoError::InvalidId)
}

pub fn video_error_response(err: VideoError) -> HandlerError {
    let status = match &err {
        VideoError::InvalidId => StatusCode::BAD_REQUEST,
        VideoError::NotFound => StatusCode::NOT_FOUND,
        VideoError::NotOwner => StatusCode::FORBIDDEN,
        VideoError::UploadIncomplete
        | VideoError::CannotOverwrite
        | VideoError::UploadInProgress => StatusCode::CONFLICT,
        VideoError::InvalidFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        VideoError::InvalidSettings(_) => StatusCode::UNPROCESSABLE_ENTITY,
        VideoError::FileIo(_)
        | VideoError::Probe(_)
        | VideoError::Thumbnail(_)
        | VideoError::Timeout { .. }
        | VideoError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if err.is_user_error() {
        return (status, err.to_string());
    }

    error!("Request failed: {}", err);
    let message = match err {
        VideoError::FileIo(_) => "Failed to store the video file",
        VideoError::Probe(_) => "Failed to read the video metadata",
        VideoError::Thumbnail(_) => "Failed to generate the video thumbnail",
        VideoError::Timeout { .. } => "Video processing timed out",
        _ => "Database error",
    };
    (status, message.to_string())
}

pub fn port_error_response(err: PortError) -> HandlerError {
    video_error_response(VideoError::from(err))
}
