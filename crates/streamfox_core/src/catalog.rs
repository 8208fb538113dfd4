//! crates/streamfox_core/src/catalog.rs
//!
//! Read side of the video library and the settings-update path.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::{Video, VideoSettings, VideoSummary};
use crate::error::VideoError;
use crate::ports::{ViewLedger, VideoRepository};
use crate::upload;

const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 256;

pub struct VideoCatalog {
    videos: Arc<dyn VideoRepository>,
    ledger: Arc<dyn ViewLedger>,
}

impl VideoCatalog {
    pub fn new(videos: Arc<dyn VideoRepository>, ledger: Arc<dyn ViewLedger>) -> Self {
        Self { videos, ledger }
    }

    pub async fn get(&self, video_id: Uuid) -> Result<Video, VideoError> {
        Ok(self.videos.get_video(video_id).await?)
    }

    pub async fn summary(&self, video: Video) -> Result<VideoSummary, VideoError> {
        let views = self.ledger.count_views(video.id).await?;
        Ok(VideoSummary { video, views })
    }

    /// Every complete video `viewer` may see, with its view count.
    pub async fn list(&self, viewer: Option<Uuid>) -> Result<Vec<VideoSummary>, VideoError> {
        let videos = self.videos.list_videos().await?;
        let mut summaries = Vec::with_capacity(videos.len());
        for video in videos {
            if video.is_complete() && video.is_visible_to(viewer) {
                summaries.push(self.summary(video).await?);
            }
        }
        Ok(summaries)
    }

    pub async fn update_settings(
        &self,
        actor: Uuid,
        video_id: Uuid,
        settings: VideoSettings,
    ) -> Result<Video, VideoError> {
        let mut video = self.videos.get_video(video_id).await?;
        ensure_owner(&video, actor)?;

        let name_len = settings.name.chars().count();
        if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&name_len) {
            return Err(VideoError::InvalidSettings(format!(
                "name must be between {} and {} characters",
                NAME_MIN_CHARS, NAME_MAX_CHARS
            )));
        }

        self.videos.update_settings(video_id, &settings).await?;
        info!("Updated settings of video {}", video_id);

        video.name = settings.name;
        video.description = settings.description;
        video.visibility = settings.visibility;
        Ok(video)
    }
}

pub fn ensure_owner(video: &Video, user_id: Uuid) -> Result<(), VideoError> {
    if !video.is_creator(user_id) {
        return Err(VideoError::NotOwner);
    }
    Ok(())
}

/// Private videos are only visible to their creator. Reported as not found
/// so their existence does not leak.
pub fn ensure_visible(video: &Video, viewer: Option<Uuid>) -> Result<(), VideoError> {
    if !video.is_visible_to(viewer) {
        return Err(VideoError::NotFound);
    }
    Ok(())
}

/// Guard for read-side consumers (streaming, metadata, thumbnails).
pub fn ensure_playable(video: &Video, viewer: Option<Uuid>) -> Result<(), VideoError> {
    ensure_visible(video, viewer)?;
    upload::ensure_complete(video)
}
