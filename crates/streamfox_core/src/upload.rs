//! crates/streamfox_core/src/upload.rs
//!
//! The video ingestion state machine: `Empty -> Uploading -> Processing -> Complete`.
//!
//! An upload streams the client's bytes to the `MediaStore`, probes the stored
//! file, and generates a thumbnail. Whatever status the call reached is written
//! back before it returns, on success and on every failure.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{Video, VideoStatus};
use crate::error::VideoError;
use crate::ports::{
    ByteStream, Clock, IdGenerator, MediaProbe, ProbeError, ThumbnailGenerator, VideoRepository,
};
use crate::storage::MediaStore;

const PROBE_STEP: &str = "probe";
const THUMBNAIL_STEP: &str = "thumbnail";

/// Limits applied to the external probe and thumbnail steps.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingLimits {
    /// How many probe/thumbnail jobs may run at once across all uploads.
    pub max_concurrent: usize,
    /// Upper bound for a single probe or thumbnail step.
    pub step_timeout: Duration,
}

impl Default for ProcessingLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            step_timeout: Duration::from_secs(120),
        }
    }
}

pub struct UploadPipeline {
    videos: Arc<dyn VideoRepository>,
    store: MediaStore,
    probe: Arc<dyn MediaProbe>,
    thumbnails: Arc<dyn ThumbnailGenerator>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    processing: Arc<Semaphore>,
    step_timeout: Duration,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

/// Marks a video as being ingested by this process until dropped.
struct UploadSlot {
    video_id: Uuid,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl UploadSlot {
    fn claim(in_flight: &Arc<Mutex<HashSet<Uuid>>>, video_id: Uuid) -> Option<Self> {
        let mut uploads = in_flight.lock().unwrap_or_else(|e| e.into_inner());
        uploads.insert(video_id).then(|| Self {
            video_id,
            in_flight: in_flight.clone(),
        })
    }
}

impl Drop for UploadSlot {
    fn drop(&mut self) {
        let mut uploads = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        uploads.remove(&self.video_id);
    }
}

impl UploadPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        videos: Arc<dyn VideoRepository>,
        store: MediaStore,
        probe: Arc<dyn MediaProbe>,
        thumbnails: Arc<dyn ThumbnailGenerator>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        limits: ProcessingLimits,
    ) -> Self {
        Self {
            videos,
            store,
            probe,
            thumbnails,
            ids,
            clock,
            processing: Arc::new(Semaphore::new(limits.max_concurrent.max(1))),
            step_timeout: limits.step_timeout,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn store(&self) -> &MediaStore {
        &self.store
    }

    /// Creates an `Empty` video owned by `creator_id`.
    pub async fn create_placeholder(&self, creator_id: Uuid) -> Result<Video, VideoError> {
        let video = Video::placeholder(self.ids.next_id(), creator_id, self.clock.now());
        self.videos.create_video(&video).await?;
        info!("Created placeholder video {} for user {}", video.id, creator_id);
        Ok(video)
    }

    /// Ingests `stream` as the media of `video_id` and returns the video in the
    /// state it reached.
    ///
    /// Failures up to and including the probe remove the stored file and leave
    /// the video at `Uploading`, so the upload can be retried. A thumbnail
    /// failure leaves the file in place and the video at `Processing`.
    pub async fn upload(&self, video_id: Uuid, stream: ByteStream) -> Result<Video, VideoError> {
        let mut video = self.videos.get_video(video_id).await?;

        if !video.accepts_upload() {
            return Err(VideoError::CannotOverwrite);
        }
        let Some(_slot) = UploadSlot::claim(&self.in_flight, video_id) else {
            return Err(VideoError::UploadInProgress);
        };
        if !self.videos.begin_upload(video_id).await? {
            return Err(VideoError::CannotOverwrite);
        }
        video.status = VideoStatus::Uploading;
        info!("Upload started for video {}", video_id);

        let outcome = self.ingest(&mut video, stream).await;

        // Finalizer: persist whatever status was reached, regardless of outcome.
        let persisted = self.videos.save_ingest_state(&video).await;

        match (outcome, persisted) {
            (Ok(()), Ok(())) => {
                info!("Upload of video {} complete", video_id);
                Ok(video)
            }
            (Ok(()), Err(e)) => {
                error!("Failed to persist completed upload of video {}: {}", video_id, e);
                Err(VideoError::Persistence(e))
            }
            (Err(e), persisted) => {
                if let Err(pe) = persisted {
                    error!(
                        "Failed to persist status {:?} of video {}: {}",
                        video.status, video_id, pe
                    );
                }
                if e.is_user_error() {
                    warn!("Upload of video {} rejected: {}", video_id, e);
                } else {
                    error!("Upload of video {} failed at {:?}: {}", video_id, video.status, e);
                }
                Err(e)
            }
        }
    }

    /// Fails with `UploadIncomplete` unless the video is ready to be served.
    pub fn ensure_complete(&self, video: &Video) -> Result<(), VideoError> {
        ensure_complete(video)
    }

    async fn ingest(&self, video: &mut Video, stream: ByteStream) -> Result<(), VideoError> {
        self.store
            .write_media(video.id, stream)
            .await
            .map_err(VideoError::FileIo)?;

        let media_path = self.store.media_path(video.id);
        let probed = self
            .bounded(PROBE_STEP, self.probe.probe(&media_path))
            .await
            .and_then(|result| {
                result.map_err(|e| match e {
                    ProbeError::UnsupportedFormat(detail) => {
                        warn!("Video {} has an unsupported format: {}", video.id, detail);
                        VideoError::InvalidFormat
                    }
                    ProbeError::Failed(detail) => VideoError::Probe(detail),
                })
            });

        let probe = match probed {
            Ok(probe) => probe,
            Err(e) => {
                self.discard_media(video.id).await;
                return Err(e);
            }
        };

        let size_bytes = match self.store.media_size(video.id).await {
            Ok(size) => size,
            Err(e) => {
                self.discard_media(video.id).await;
                return Err(VideoError::FileIo(e));
            }
        };

        video.mime_type = Some(probe.mime_type);
        video.duration_secs = probe.duration_secs;
        video.size_bytes = size_bytes;
        video.status = VideoStatus::Processing;

        let thumbnail_path = self.store.thumbnail_path(video.id);
        self.bounded(THUMBNAIL_STEP, self.thumbnails.generate(&media_path, &thumbnail_path))
            .await?
            .map_err(|e| VideoError::Thumbnail(e.to_string()))?;

        video.status = VideoStatus::Complete;
        Ok(())
    }

    /// Runs an external processing step under the concurrency bound and timeout.
    async fn bounded<T>(
        &self,
        step: &'static str,
        work: impl Future<Output = T>,
    ) -> Result<T, VideoError> {
        let _permit = self
            .processing
            .acquire()
            .await
            .map_err(|_| step_failure(step, format!("{} pool is closed", step)))?;

        tokio::time::timeout(self.step_timeout, work)
            .await
            .map_err(|_| VideoError::Timeout {
                step,
                after: self.step_timeout,
            })
    }

    async fn discard_media(&self, video_id: Uuid) {
        if let Err(e) = self.store.remove_media(video_id).await {
            error!("Failed to remove rejected media of video {}: {}", video_id, e);
        }
    }
}

/// Server error for an external processing step that could not run.
fn step_failure(step: &'static str, reason: String) -> VideoError {
    match step {
        THUMBNAIL_STEP => VideoError::Thumbnail(reason),
        _ => VideoError::Probe(reason),
    }
}

pub fn ensure_complete(video: &Video) -> Result<(), VideoError> {
    if video.status < VideoStatus::Complete {
        return Err(VideoError::UploadIncomplete);
    }
    Ok(())
}
