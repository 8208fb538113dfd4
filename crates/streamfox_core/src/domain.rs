//! crates/streamfox_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Fraction of a video's size and duration that has to be streamed and watched
/// before a session counts as a view.
pub const DEFAULT_WATCH_THRESHOLD: f64 = 0.6;

/// Lifecycle stage of a video's ingestion. The declaration order is the
/// lifecycle order, so `<` and `>` compare stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VideoStatus {
    Empty,
    Uploading,
    Processing,
    Complete,
}

impl VideoStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            VideoStatus::Empty => 0,
            VideoStatus::Uploading => 1,
            VideoStatus::Processing => 2,
            VideoStatus::Complete => 3,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(VideoStatus::Empty),
            1 => Some(VideoStatus::Uploading),
            2 => Some(VideoStatus::Processing),
            3 => Some(VideoStatus::Complete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Private,
    Unlisted,
    Public,
}

impl Visibility {
    pub fn as_i16(self) -> i16 {
        match self {
            Visibility::Private => 0,
            Visibility::Unlisted => 1,
            Visibility::Public => 2,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Visibility::Private),
            1 => Some(Visibility::Unlisted),
            2 => Some(Visibility::Public),
            _ => None,
        }
    }
}

/// A user-uploaded video and the metadata derived from its stored file.
#[derive(Debug, Clone, PartialEq)]
pub struct Video {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    pub status: VideoStatus,
    pub mime_type: Option<String>,
    pub duration_secs: u32,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl Video {
    pub const DEFAULT_NAME: &'static str = "Untitled video";

    /// A freshly created video with no media attached yet.
    pub fn placeholder(id: Uuid, creator_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            creator_id,
            name: Self::DEFAULT_NAME.to_string(),
            description: String::new(),
            visibility: Visibility::Private,
            status: VideoStatus::Empty,
            mime_type: None,
            duration_secs: 0,
            size_bytes: 0,
            created_at,
        }
    }

    pub fn is_creator(&self, user_id: Uuid) -> bool {
        self.creator_id == user_id
    }

    pub fn is_complete(&self) -> bool {
        self.status == VideoStatus::Complete
    }

    /// Whether a new upload may (re-)start: only before the media is fully accepted.
    pub fn accepts_upload(&self) -> bool {
        self.status <= VideoStatus::Uploading
    }

    pub fn is_visible_to(&self, viewer: Option<Uuid>) -> bool {
        match self.visibility {
            Visibility::Private => viewer.is_some_and(|id| self.is_creator(id)),
            Visibility::Unlisted | Visibility::Public => true,
        }
    }
}

/// The user-editable part of a video. Never overlaps with ingestion metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
}

/// A video together with its counted views, as shown in listings.
#[derive(Debug, Clone)]
pub struct VideoSummary {
    pub video: Video,
    pub views: u64,
}

/// What a `MediaProbe` learns about a stored file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub mime_type: String,
    pub duration_secs: u32,
}

/// A user's single active watch record.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchSession {
    pub user_id: Uuid,
    pub video_id: Uuid,
    pub view_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub bytes_streamed: u64,
}

impl WatchSession {
    pub fn start(user_id: Uuid, video_id: Uuid, view_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            video_id,
            view_id,
            started_at: now,
            bytes_streamed: 0,
        }
    }
}

/// Result of the get-or-start upsert on a user's watch record.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// The user had no watch record yet.
    Created(WatchSession),
    /// The user was watching a different video; all progress was discarded.
    Reset(WatchSession),
    /// The user was already watching this video; progress is kept.
    Resumed(WatchSession),
}

impl SessionOutcome {
    pub fn session(&self) -> &WatchSession {
        match self {
            SessionOutcome::Created(s) | SessionOutcome::Reset(s) | SessionOutcome::Resumed(s) => s,
        }
    }

    pub fn into_session(self) -> WatchSession {
        match self {
            SessionOutcome::Created(s) | SessionOutcome::Reset(s) | SessionOutcome::Resumed(s) => s,
        }
    }
}

/// How far a session still is from counting as a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConditions {
    pub remaining_bytes: u64,
    pub remaining_time_ms: u64,
}

impl WatchConditions {
    pub fn compute(
        session: &WatchSession,
        video: &Video,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let minimum = Self::unstarted(video, threshold);
        // A clock that stepped backwards counts as no time watched.
        let elapsed_ms = (now - session.started_at).num_milliseconds().max(0) as u64;

        Self {
            remaining_bytes: minimum.remaining_bytes.saturating_sub(session.bytes_streamed),
            remaining_time_ms: minimum.remaining_time_ms.saturating_sub(elapsed_ms),
        }
    }

    /// What a session that has not streamed or watched anything yet still needs.
    pub fn unstarted(video: &Video, threshold: f64) -> Self {
        Self {
            remaining_bytes: (video.size_bytes as f64 * threshold).ceil() as u64,
            remaining_time_ms: (f64::from(video.duration_secs) * 1000.0 * threshold).ceil() as u64,
        }
    }

    pub fn is_met(&self) -> bool {
        self.remaining_bytes == 0 && self.remaining_time_ms == 0
    }
}

/// Outcome of a "still watching" poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOutcome {
    /// This poll registered the session's view.
    Success,
    /// The session's view was already counted.
    Duplicate,
    TimeNotPassed { remaining_ms: u64 },
    NotStreamedEnough { remaining_bytes: u64 },
}

/// Answer to "how much longer until this session can count?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredWatchTime {
    AlreadyCounted,
    Remaining { ms: u64 },
}

impl RequiredWatchTime {
    /// Wire form: the remaining milliseconds, or `-1` once the view is counted.
    pub fn as_millis_or_sentinel(self) -> i64 {
        match self {
            RequiredWatchTime::AlreadyCounted => -1,
            RequiredWatchTime::Remaining { ms } => i64::try_from(ms).unwrap_or(i64::MAX),
        }
    }
}
