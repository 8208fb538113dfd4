//! services/api/src/web/playback.rs
//!
//! Playback endpoints: media streaming and the view-counting polls that go
//! with it.

use crate::web::{
    errors::{port_error_response, video_error_response, HandlerError},
    range::{parse_range, RangeRequest},
    rest::load_video,
    state::AppState,
};
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use futures::{Stream, StreamExt};
use std::io::SeekFrom;
use std::sync::Arc;
use streamfox_core::{ensure_playable, Video, ViewOutcome, WatchIntegrityEngine};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;
use tracing::error;
use uuid::Uuid;

/// Delivered bytes are written to the watch session at least this often.
const RECORD_EVERY_BYTES: u64 = 1024 * 1024;

//=========================================================================================
// Streamed Byte Accounting
//=========================================================================================

/// Accumulates the bytes handed to the client and reports them to the user's
/// watch session in batches, and once more when the response is dropped.
struct StreamTally {
    engine: Arc<WatchIntegrityEngine>,
    user_id: Uuid,
    video: Arc<Video>,
    pending: u64,
}

impl StreamTally {
    fn new(engine: Arc<WatchIntegrityEngine>, user_id: Uuid, video: Arc<Video>) -> Self {
        Self {
            engine,
            user_id,
            video,
            pending: 0,
        }
    }

    fn add(&mut self, bytes: u64) {
        self.pending += bytes;
        if self.pending >= RECORD_EVERY_BYTES {
            self.flush();
        }
    }

    fn flush(&mut self) {
        let bytes = std::mem::take(&mut self.pending);
        if bytes == 0 {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("No runtime to record {} streamed bytes of video {}", bytes, self.video.id);
            return;
        };

        let engine = self.engine.clone();
        let video = self.video.clone();
        let user_id = self.user_id;
        runtime.spawn(async move {
            if let Err(e) = engine.record_streamed_bytes(user_id, &video, bytes).await {
                error!(
                    "Failed to record {} streamed bytes of video {} for user {}: {:?}",
                    bytes, video.id, user_id, e
                );
            }
        });
    }
}

impl Drop for StreamTally {
    fn drop(&mut self) {
        self.flush();
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Stream the media of a video. Supports a single `Range`.
#[utoipa::path(
    get,
    path = "/videos/{id}/stream",
    responses(
        (status = 200, description = "Whole media file"),
        (status = 206, description = "Requested byte range"),
        (status = 409, description = "Upload not complete"),
        (status = 416, description = "Range not satisfiable")
    ),
    params(("id" = String, Path, description = "Video identifier"))
)]
pub async fn stream_video_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, HandlerError> {
    let video = load_video(&app_state, &id).await?;
    ensure_playable(&video, Some(user_id)).map_err(video_error_response)?;

    app_state
        .watch
        .get_or_start_session(user_id, &video)
        .await
        .map_err(port_error_response)?;

    let path = app_state.pipeline.store().media_path(video.id);
    let storage_error = |e: std::io::Error| {
        error!("Failed to read media {}: {}", path.display(), e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read the video file".to_string(),
        )
    };
    let file = File::open(&path).await.map_err(storage_error)?;
    let total = file.metadata().await.map_err(storage_error)?.len();

    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let range = parse_range(range_header, total);
    let Some((status, start, length)) = plan_slice(range, total) else {
        return Ok((
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{}", total))],
        )
            .into_response());
    };

    let chunks = open_slice(file, start, length).await.map_err(storage_error)?;
    let mime_type = video
        .mime_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let tally = StreamTally::new(app_state.watch.clone(), user_id, Arc::new(video));
    let body = Body::from_stream(counted(chunks, tally));

    media_response(status, range, total, &mime_type, length, body).map_err(|e| {
        error!("Failed to build stream response: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to stream the video".to_string(),
        )
    })
}

/// Status, first byte and length to serve, or `None` if the range cannot be served.
fn plan_slice(range: RangeRequest, total: u64) -> Option<(StatusCode, u64, u64)> {
    match range {
        RangeRequest::Full => Some((StatusCode::OK, 0, total)),
        RangeRequest::Partial(r) => Some((StatusCode::PARTIAL_CONTENT, r.start, r.len())),
        RangeRequest::Unsatisfiable => None,
    }
}

async fn open_slice(
    mut file: File,
    start: u64,
    length: u64,
) -> std::io::Result<ReaderStream<Take<File>>> {
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    Ok(ReaderStream::new(file.take(length)))
}

/// Passes `chunks` through, tallying every delivered byte.
fn counted<S>(
    mut chunks: S,
    mut tally: StreamTally,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin + 'static,
{
    async_stream::stream! {
        while let Some(chunk) = chunks.next().await {
            if let Ok(bytes) = &chunk {
                tally.add(bytes.len() as u64);
            }
            yield chunk;
        }
    }
}

fn media_response(
    status: StatusCode,
    range: RangeRequest,
    total: u64,
    mime_type: &str,
    length: u64,
    body: Body,
) -> Result<Response, axum::http::Error> {
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, mime_type)
        .header(header::CONTENT_LENGTH, length)
        .header(header::ACCEPT_RANGES, "bytes");
    if let RangeRequest::Partial(r) = range {
        builder = builder.header(header::CONTENT_RANGE, r.content_range(total));
    }
    builder.body(body)
}

/// Milliseconds the caller still has to keep watching before a poll can count,
/// or `-1` when the view of the current session is already counted.
#[utoipa::path(
    get,
    path = "/videos/{id}/watch-time",
    responses(
        (status = 200, description = "Remaining milliseconds, or -1", body = i64),
        (status = 409, description = "Upload not complete")
    ),
    params(("id" = String, Path, description = "Video identifier"))
)]
pub async fn required_watch_time_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
) -> Result<Json<i64>, HandlerError> {
    let video = load_video(&app_state, &id).await?;
    ensure_playable(&video, Some(user_id)).map_err(video_error_response)?;

    let required = app_state
        .watch
        .required_watch_time(user_id, &video)
        .await
        .map_err(port_error_response)?;
    Ok(Json(required.as_millis_or_sentinel()))
}

/// Poll sent by a playing client. Counts the view once the session has
/// streamed and watched enough of the video.
#[utoipa::path(
    post,
    path = "/videos/{id}/still-watching",
    responses(
        (status = 204, description = "View counted"),
        (status = 409, description = "View already counted"),
        (status = 422, description = "Not watched or streamed enough yet")
    ),
    params(("id" = String, Path, description = "Video identifier"))
)]
pub async fn still_watching_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(id): Path<String>,
) -> Result<StatusCode, HandlerError> {
    let video = load_video(&app_state, &id).await?;
    ensure_playable(&video, Some(user_id)).map_err(video_error_response)?;

    let outcome = app_state
        .watch
        .try_register_view(user_id, &video)
        .await
        .map_err(port_error_response)?;
    view_outcome_response(outcome)
}

fn view_outcome_response(outcome: ViewOutcome) -> Result<StatusCode, HandlerError> {
    match outcome {
        ViewOutcome::Success => Ok(StatusCode::NO_CONTENT),
        ViewOutcome::Duplicate => Err((
            StatusCode::CONFLICT,
            "This view has already been counted".to_string(),
        )),
        ViewOutcome::TimeNotPassed { remaining_ms } => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("You need to watch another {}ms.", remaining_ms),
        )),
        ViewOutcome::NotStreamedEnough { remaining_bytes } => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("You need to stream another {} bytes.", remaining_bytes),
        )),
    }
}
