//! services/api/src/adapters/thumbnail.rs
//!
//! This module contains the adapter that extracts a still frame with `ffmpeg`.
//! It implements the `ThumbnailGenerator` port from the `core` crate.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use streamfox_core::ports::{PortError, PortResult, ThumbnailGenerator};
use tokio::process::Command;
use tracing::debug;

const THUMBNAIL_WIDTH: u32 = 640;

/// Seek offsets tried in order. Media shorter than the first offset has no
/// frame there, so the first frame is the fallback.
const SEEK_OFFSETS: [&str; 2] = ["1", "0"];

fn thumbnail_args(media_path: &Path, thumbnail_path: &Path, seek: &str) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        seek.to_string(),
        "-i".to_string(),
        media_path.to_string_lossy().into_owned(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        format!("scale={}:-2", THUMBNAIL_WIDTH),
        "-f".to_string(),
        "image2".to_string(),
        "-c:v".to_string(),
        "mjpeg".to_string(),
        thumbnail_path.to_string_lossy().into_owned(),
    ]
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `ThumbnailGenerator` port by running `ffmpeg`.
#[derive(Clone)]
pub struct FfmpegThumbnailAdapter {
    ffmpeg_path: PathBuf,
}

impl FfmpegThumbnailAdapter {
    /// Creates a new `FfmpegThumbnailAdapter`.
    pub fn new(ffmpeg_path: PathBuf) -> Self {
        Self { ffmpeg_path }
    }

    async fn extract_frame(
        &self,
        media_path: &Path,
        thumbnail_path: &Path,
        seek: &str,
    ) -> PortResult<bool> {
        let output = Command::new(&self.ffmpeg_path)
            .args(thumbnail_args(media_path, thumbnail_path, seek))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to run ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PortError::Unexpected(format!(
                "ffmpeg failed (exit code {}): {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        // ffmpeg succeeds without writing anything when the seek lands past the end.
        let written = tokio::fs::metadata(thumbnail_path)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        Ok(written)
    }
}

#[async_trait]
impl ThumbnailGenerator for FfmpegThumbnailAdapter {
    async fn generate(&self, media_path: &Path, thumbnail_path: &Path) -> PortResult<()> {
        let mut last_error = None;

        for seek in SEEK_OFFSETS {
            match self.extract_frame(media_path, thumbnail_path, seek).await {
                Ok(true) => return Ok(()),
                Ok(false) => debug!("No frame at {}s of {}", seek, media_path.display()),
                Err(e) => {
                    debug!("Frame extraction at {}s failed: {}", seek, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| PortError::Unexpected("ffmpeg produced no thumbnail".to_string())))
    }
}
