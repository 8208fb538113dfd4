//! services/api/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the browser client and the API server.

use serde::{Deserialize, Serialize};
use streamfox_core::domain::{Video, VideoSettings, VideoSummary, Visibility};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityDto {
    Private,
    Unlisted,
    Public,
}

impl From<Visibility> for VisibilityDto {
    fn from(v: Visibility) -> Self {
        match v {
            Visibility::Private => VisibilityDto::Private,
            Visibility::Unlisted => VisibilityDto::Unlisted,
            Visibility::Public => VisibilityDto::Public,
        }
    }
}

impl From<VisibilityDto> for Visibility {
    fn from(v: VisibilityDto) -> Self {
        match v {
            VisibilityDto::Private => Visibility::Private,
            VisibilityDto::Unlisted => Visibility::Unlisted,
            VisibilityDto::Public => Visibility::Public,
        }
    }
}

//=========================================================================================
// Requests
//=========================================================================================

/// New name, description and visibility of a video. All fields are required.
#[derive(Deserialize, Debug, ToSchema)]
pub struct UpdateVideoRequest {
    pub name: String,
    pub description: String,
    pub visibility: VisibilityDto,
}

impl From<UpdateVideoRequest> for VideoSettings {
    fn from(req: UpdateVideoRequest) -> Self {
        VideoSettings {
            name: req.name,
            description: req.description,
            visibility: req.visibility.into(),
        }
    }
}

//=========================================================================================
// Responses
//=========================================================================================

/// The response payload sent after successfully creating a placeholder video.
#[derive(Serialize, Debug, ToSchema)]
pub struct VideoCreatedResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub visibility: VisibilityDto,
}

impl From<&Video> for VideoCreatedResponse {
    fn from(video: &Video) -> Self {
        Self {
            id: video.id,
            name: video.name.clone(),
            description: video.description.clone(),
            visibility: video.visibility.into(),
        }
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct VideoInfoResponse {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub description: String,
    pub visibility: VisibilityDto,
    pub duration_secs: u32,
    pub views: u64,
}

impl From<VideoSummary> for VideoInfoResponse {
    fn from(summary: VideoSummary) -> Self {
        let video = summary.video;
        Self {
            id: video.id,
            creator_id: video.creator_id,
            name: video.name,
            description: video.description,
            visibility: video.visibility.into(),
            duration_secs: video.duration_secs,
            views: summary.views,
        }
    }
}
