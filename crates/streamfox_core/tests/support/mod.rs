//! In-memory port implementations shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use streamfox_core::{
    ByteStream, Clock, MediaProbe, PortError, PortResult, ProbeError, ProbeInfo, SessionOutcome,
    ThumbnailGenerator, UserDirectory, Video, VideoRepository, VideoSettings, VideoStatus,
    ViewLedger, WatchSession, WatchSessionStore,
};
use uuid::Uuid;

pub const CORRUPT_MEDIA: &[u8] = b"not a video";

//=========================================================================================
// Database
//=========================================================================================

#[derive(Default)]
pub struct MemoryDb {
    users: Mutex<HashSet<Uuid>>,
    videos: Mutex<HashMap<Uuid, Video>>,
    status_history: Mutex<HashMap<Uuid, Vec<VideoStatus>>>,
    watches: Mutex<HashMap<Uuid, WatchSession>>,
    views: Mutex<HashMap<Uuid, Uuid>>,
    pub fail_writes: AtomicBool,
}

impl MemoryDb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_video(&self, video: Video) {
        self.videos.lock().unwrap().insert(video.id, video);
    }

    pub fn video(&self, video_id: Uuid) -> Video {
        self.videos.lock().unwrap()[&video_id].clone()
    }

    /// Every status written for the video, in write order.
    pub fn status_history(&self, video_id: Uuid) -> Vec<VideoStatus> {
        self.status_history
            .lock()
            .unwrap()
            .get(&video_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clear_status_history(&self, video_id: Uuid) {
        self.status_history.lock().unwrap().remove(&video_id);
    }

    pub fn watch(&self, user_id: Uuid) -> Option<WatchSession> {
        self.watches.lock().unwrap().get(&user_id).cloned()
    }

    fn check_writable(&self) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("database unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryDb {
    async fn get_or_create_user(&self, user_id: Uuid) -> PortResult<()> {
        self.users.lock().unwrap().insert(user_id);
        Ok(())
    }
}

#[async_trait]
impl VideoRepository for MemoryDb {
    async fn create_video(&self, video: &Video) -> PortResult<()> {
        self.check_writable()?;
        self.videos.lock().unwrap().insert(video.id, video.clone());
        Ok(())
    }

    async fn get_video(&self, video_id: Uuid) -> PortResult<Video> {
        self.videos
            .lock()
            .unwrap()
            .get(&video_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Video {} not found", video_id)))
    }

    async fn list_videos(&self) -> PortResult<Vec<Video>> {
        let mut videos: Vec<Video> = self.videos.lock().unwrap().values().cloned().collect();
        videos.sort_by_key(|v| v.id);
        Ok(videos)
    }

    async fn update_settings(&self, video_id: Uuid, settings: &VideoSettings) -> PortResult<()> {
        self.check_writable()?;
        let mut videos = self.videos.lock().unwrap();
        let video = videos
            .get_mut(&video_id)
            .ok_or_else(|| PortError::NotFound(format!("Video {} not found", video_id)))?;
        video.name = settings.name.clone();
        video.description = settings.description.clone();
        video.visibility = settings.visibility;
        Ok(())
    }

    async fn begin_upload(&self, video_id: Uuid) -> PortResult<bool> {
        self.check_writable()?;
        let mut videos = self.videos.lock().unwrap();
        let video = videos
            .get_mut(&video_id)
            .ok_or_else(|| PortError::NotFound(format!("Video {} not found", video_id)))?;
        if video.status > VideoStatus::Uploading {
            return Ok(false);
        }
        video.status = VideoStatus::Uploading;
        self.status_history
            .lock()
            .unwrap()
            .entry(video_id)
            .or_default()
            .push(VideoStatus::Uploading);
        Ok(true)
    }

    async fn save_ingest_state(&self, video: &Video) -> PortResult<()> {
        self.check_writable()?;
        let mut videos = self.videos.lock().unwrap();
        let stored = videos
            .get_mut(&video.id)
            .ok_or_else(|| PortError::NotFound(format!("Video {} not found", video.id)))?;
        stored.status = video.status;
        stored.mime_type = video.mime_type.clone();
        stored.duration_secs = video.duration_secs;
        stored.size_bytes = video.size_bytes;
        self.status_history
            .lock()
            .unwrap()
            .entry(video.id)
            .or_default()
            .push(video.status);
        Ok(())
    }
}

#[async_trait]
impl WatchSessionStore for MemoryDb {
    async fn get_or_start(&self, fresh: WatchSession) -> PortResult<SessionOutcome> {
        let mut watches = self.watches.lock().unwrap();
        let outcome = match watches.get(&fresh.user_id) {
            None => SessionOutcome::Created(fresh.clone()),
            Some(existing) if existing.video_id == fresh.video_id => {
                return Ok(SessionOutcome::Resumed(existing.clone()));
            }
            Some(_) => SessionOutcome::Reset(fresh.clone()),
        };
        watches.insert(fresh.user_id, fresh);
        Ok(outcome)
    }

    async fn get(&self, user_id: Uuid) -> PortResult<Option<WatchSession>> {
        Ok(self.watches.lock().unwrap().get(&user_id).cloned())
    }

    async fn add_streamed_bytes(
        &self,
        user_id: Uuid,
        video_id: Uuid,
        bytes: u64,
    ) -> PortResult<bool> {
        let mut watches = self.watches.lock().unwrap();
        match watches.get_mut(&user_id) {
            Some(watch) if watch.video_id == video_id => {
                watch.bytes_streamed = watch.bytes_streamed.saturating_add(bytes);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ViewLedger for MemoryDb {
    async fn has_view(&self, view_id: Uuid) -> PortResult<bool> {
        Ok(self.views.lock().unwrap().contains_key(&view_id))
    }

    async fn insert_view(
        &self,
        video_id: Uuid,
        view_id: Uuid,
        _counted_at: DateTime<Utc>,
    ) -> PortResult<bool> {
        let mut views = self.views.lock().unwrap();
        if views.contains_key(&view_id) {
            return Ok(false);
        }
        views.insert(view_id, video_id);
        Ok(true)
    }

    async fn count_views(&self, video_id: Uuid) -> PortResult<u64> {
        Ok(self
            .views
            .lock()
            .unwrap()
            .values()
            .filter(|v| **v == video_id)
            .count() as u64)
    }
}

//=========================================================================================
// Clock
//=========================================================================================

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc::now()),
        })
    }

    pub fn advance_ms(&self, ms: i64) {
        *self.now.lock().unwrap() += ChronoDuration::milliseconds(ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

//=========================================================================================
// Media processing
//=========================================================================================

/// Accepts any file except `CORRUPT_MEDIA`. Tracks how many probes run at once.
pub struct FakeProbe {
    pub duration_secs: u32,
    pub delay: Duration,
    pub fail: AtomicBool,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FakeProbe {
    pub fn new(duration_secs: u32) -> Arc<Self> {
        Self::with_delay(duration_secs, Duration::ZERO)
    }

    pub fn with_delay(duration_secs: u32, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            duration_secs,
            delay,
            fail: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn probe(&self, media_path: &Path) -> Result<ProbeInfo, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let contents = std::fs::read(media_path);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(ProbeError::Failed("ffprobe crashed".into()));
        }
        let contents = contents.map_err(|e| ProbeError::Failed(e.to_string()))?;
        if contents == CORRUPT_MEDIA {
            return Err(ProbeError::UnsupportedFormat("unknown container".into()));
        }
        Ok(ProbeInfo {
            mime_type: "video/mp4".into(),
            duration_secs: self.duration_secs,
        })
    }
}

#[derive(Default)]
pub struct FakeThumbnails {
    pub fail: AtomicBool,
}

impl FakeThumbnails {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ThumbnailGenerator for FakeThumbnails {
    async fn generate(&self, _media_path: &Path, thumbnail_path: &Path) -> PortResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("ffmpeg exited with status 1".into()));
        }
        std::fs::write(thumbnail_path, b"jpeg").map_err(|e| PortError::Unexpected(e.to_string()))
    }
}

//=========================================================================================
// Streams
//=========================================================================================

pub fn bytes_stream(data: &[u8]) -> ByteStream {
    let chunks: Vec<Result<Bytes, PortError>> = data
        .chunks(4)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Box::pin(stream::iter(chunks))
}

/// Yields `data` and then fails, like a client that disconnects mid-upload.
pub fn aborted_stream(data: &[u8]) -> ByteStream {
    let chunks: Vec<Result<Bytes, PortError>> = vec![
        Ok(Bytes::copy_from_slice(data)),
        Err(PortError::Unexpected("client disconnected".into())),
    ];
    Box::pin(stream::iter(chunks))
}

pub fn is_non_decreasing(statuses: &[VideoStatus]) -> bool {
    statuses.windows(2).all(|w| w[0] <= w[1])
}
