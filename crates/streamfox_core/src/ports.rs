//! crates/streamfox_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or
//! media tooling.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::path::Path;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{ProbeInfo, SessionOutcome, Video, VideoSettings, WatchSession};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Raw media bytes as they arrive from a client.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, PortError>> + Send>>;

/// Failure modes of a `MediaProbe`. An unsupported format is the uploader's
/// fault, a failed probe is ours.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Unsupported media format: {0}")]
    UnsupportedFormat(String),
    #[error("Probe failed: {0}")]
    Failed(String),
}

//=========================================================================================
// Persistence Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Makes sure a user row exists for an identity coming from the edge.
    async fn get_or_create_user(&self, user_id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn create_video(&self, video: &Video) -> PortResult<()>;

    async fn get_video(&self, video_id: Uuid) -> PortResult<Video>;

    async fn list_videos(&self) -> PortResult<Vec<Video>>;

    /// Writes name, description and visibility only.
    async fn update_settings(&self, video_id: Uuid, settings: &VideoSettings) -> PortResult<()>;

    /// Atomically moves a video to `Uploading` if its status is `Empty` or
    /// `Uploading`. Returns `false` when the video is already past that point.
    async fn begin_upload(&self, video_id: Uuid) -> PortResult<bool>;

    /// Persists status, MIME type, duration and size. Never touches settings.
    async fn save_ingest_state(&self, video: &Video) -> PortResult<()>;
}

#[async_trait]
pub trait WatchSessionStore: Send + Sync {
    /// Atomic get-or-create keyed by user. If the existing record targets a
    /// different video it is overwritten with `fresh`; if it targets
    /// `fresh.video_id` it is returned untouched.
    async fn get_or_start(&self, fresh: WatchSession) -> PortResult<SessionOutcome>;

    /// The user's current session, if any. Never creates one.
    async fn get(&self, user_id: Uuid) -> PortResult<Option<WatchSession>>;

    /// Atomically adds `bytes` to the user's session, provided the session still
    /// targets `video_id`. Returns `false` if it does not.
    async fn add_streamed_bytes(&self, user_id: Uuid, video_id: Uuid, bytes: u64)
        -> PortResult<bool>;
}

#[async_trait]
pub trait ViewLedger: Send + Sync {
    async fn has_view(&self, view_id: Uuid) -> PortResult<bool>;

    /// Inserts the ledger entry at most once. Returns `false` if an entry for
    /// `view_id` already existed.
    async fn insert_view(
        &self,
        video_id: Uuid,
        view_id: Uuid,
        counted_at: DateTime<Utc>,
    ) -> PortResult<bool>;

    async fn count_views(&self, video_id: Uuid) -> PortResult<u64>;
}

//=========================================================================================
// Media Processing Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Reads the container of a stored file and reports its MIME type and duration.
    async fn probe(&self, media_path: &Path) -> Result<ProbeInfo, ProbeError>;
}

#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    /// Writes a still frame of `media_path` to `thumbnail_path`.
    async fn generate(&self, media_path: &Path, thumbnail_path: &Path) -> PortResult<()>;
}

//=========================================================================================
// Ambient Dependencies
//=========================================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Uuid;
}

/// Issues UUIDv7 identifiers, which sort by creation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeOrderedIds;

impl IdGenerator for TimeOrderedIds {
    fn next_id(&self) -> Uuid {
        Uuid::now_v7()
    }
}
