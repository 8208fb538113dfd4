//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the video management endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{
    errors::{parse_video_id, video_error_response, HandlerError},
    playback,
    protocol::{UpdateVideoRequest, VideoCreatedResponse, VideoInfoResponse, VisibilityDto},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use futures::TryStreamExt;
use std::sync::Arc;
use streamfox_core::{ensure_owner, ensure_playable, ByteStream, PortError, Video};
use tracing::{error, info};
use utoipa::OpenApi;
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_video_handler,
        list_videos_handler,
        get_video_handler,
        update_video_handler,
        upload_video_handler,
        get_thumbnail_handler,
        playback::stream_video_handler,
        playback::required_watch_time_handler,
        playback::still_watching_handler,
    ),
    components(
        schemas(VideoCreatedResponse, VideoInfoResponse, UpdateVideoRequest, VisibilityDto)
    ),
    tags(
        (name = "Streamfox API", description = "Video upload, playback and view counting.")
    )
)]
pub struct ApiDoc;

/// Fetches the video named in the path.
pub(crate) async fn load_video(app_state: &AppState, raw_id: &str) -> Result<Video, HandlerError> {
    let video_id = parse_video_id(raw_id).map_err(video_error_response)?;
    app_state
        .catalog
        .get(video_id)
        .await
        .map_err(video_error_response)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Create an empty placeholder video owned by the caller.
#[utoipa::path(
    post,
    path = "/videos",
    responses(
        (status = 201, description = "Placeholder created", body = VideoCreatedResponse),
        (status = 401, description = "Missing or invalid x-user-id header"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn create_video_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let video = app_state
        .pipeline
        .create_placeholder(user_id)
        .await
        .map_err(video_error_response)?;

    Ok((StatusCode::CREATED, Json(VideoCreatedResponse::from(&video))))
}

/// List every playable video the caller can see, newest first.
#[utoipa::path(
    get,
    path = "/videos",
    responses(
        (status = 200, description = "Video listing", body = [VideoInfoResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_videos_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<Json<Vec<VideoInfoResponse>>, HandlerError> {
    let summaries = app_state
        .catalog
        .list(Some(user_id))
        .await
        .map_err(video_error_response)?;

    Ok(Json(summaries.into_iter().map(VideoInfoResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/videos/{id}",
    responses(
        (status = 200, description = "Video metadata", body = VideoInfoResponse),
        (status = 404, description = "No such video"),
        (status = 409, description = "Upload not complete")
    ),
    params(("id" = String, Path, description = "Video identifier"))
)]
pub async fn get_video_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
) -> Result<Json<VideoInfoResponse>, HandlerError> {
    let video = load_video(&app_state, &id).await?;
    ensure_playable(&video, Some(user_id)).map_err(video_error_response)?;

    let summary = app_state
        .catalog
        .summary(video)
        .await
        .map_err(video_error_response)?;
    Ok(Json(summary.into()))
}

/// Change the name, description and visibility of a video the caller owns.
#[utoipa::path(
    put,
    path = "/videos/{id}",
    request_body = UpdateVideoRequest,
    responses(
        (status = 204, description = "Settings updated"),
        (status = 403, description = "Video owned by another user"),
        (status = 422, description = "Invalid settings")
    ),
    params(("id" = String, Path, description = "Video identifier"))
)]
pub async fn update_video_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
    Json(update): Json<UpdateVideoRequest>,
) -> Result<StatusCode, HandlerError> {
    let video_id = parse_video_id(&id).map_err(video_error_response)?;
    app_state
        .catalog
        .update_settings(user_id, video_id, update.into())
        .await
        .map_err(video_error_response)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Upload the raw media of a video the caller owns.
///
/// The request body is the media file itself. It is streamed to disk, probed,
/// and thumbnailed before the video becomes playable.
#[utoipa::path(
    put,
    path = "/videos/{id}/video",
    request_body(content_type = "application/octet-stream", description = "Raw media bytes."),
    responses(
        (status = 204, description = "Video uploaded and processed"),
        (status = 403, description = "Video owned by another user"),
        (status = 409, description = "Video already uploaded, or an upload is in progress"),
        (status = 415, description = "Unsupported or corrupt video format"),
        (status = 500, description = "Storage or processing failure")
    ),
    params(("id" = String, Path, description = "Video identifier"))
)]
pub async fn upload_video_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
    body: Body,
) -> Result<StatusCode, HandlerError> {
    let video = load_video(&app_state, &id).await?;
    ensure_owner(&video, user_id).map_err(video_error_response)?;

    let stream: ByteStream = Box::pin(
        body.into_data_stream()
            .map_err(|e| PortError::Unexpected(format!("Upload body failed: {}", e))),
    );

    // Runs detached so the status is persisted even if the client goes away.
    let pipeline = app_state.pipeline.clone();
    let video_id = video.id;
    let outcome = tokio::spawn(async move { pipeline.upload(video_id, stream).await })
        .await
        .map_err(|e| {
            error!("Upload task for video {} panicked: {}", video_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Upload failed".to_string())
        })?;

    let video = outcome.map_err(video_error_response)?;
    info!(
        "Video {} uploaded by {} ({} bytes, {}s)",
        video.id, user_id, video.size_bytes, video.duration_secs
    );
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/videos/{id}/thumbnail",
    responses(
        (status = 200, description = "JPEG thumbnail", content_type = "image/jpeg"),
        (status = 404, description = "No such video"),
        (status = 409, description = "Upload not complete")
    ),
    params(("id" = String, Path, description = "Video identifier"))
)]
pub async fn get_thumbnail_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let video = load_video(&app_state, &id).await?;
    ensure_playable(&video, Some(user_id)).map_err(video_error_response)?;

    let path = app_state.pipeline.store().thumbnail_path(video.id);
    let image = tokio::fs::read(&path).await.map_err(|e| {
        error!("Failed to read thumbnail {}: {}", path.display(), e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read the thumbnail".to_string(),
        )
    })?;

    Ok(([(header::CONTENT_TYPE, "image/jpeg")], image))
}
