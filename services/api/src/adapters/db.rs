//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the persistence ports from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Every read-modify-write on a watch record is a single SQL statement, so
//! concurrent requests from the same user serialize on the row lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use streamfox_core::domain::{
    SessionOutcome, Video, VideoSettings, VideoStatus, Visibility, WatchSession,
};
use streamfox_core::ports::{
    PortError, PortResult, UserDirectory, VideoRepository, ViewLedger, WatchSessionStore,
};
use tracing::warn;
use uuid::Uuid;

/// How often `get_or_start` retries when another request switches the
/// session between its upsert and its read.
const SESSION_UPSERT_ATTEMPTS: usize = 3;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the persistence ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const VIDEO_COLUMNS: &str = "id, creator_id, name, description, visibility, status, \
                             mime_type, duration_secs, size_bytes, created_at";

const WATCH_COLUMNS: &str = "user_id, video_id, view_id, started_at, bytes_streamed";

#[derive(FromRow)]
struct VideoRecord {
    id: Uuid,
    creator_id: Uuid,
    name: String,
    description: String,
    visibility: i16,
    status: i16,
    mime_type: Option<String>,
    duration_secs: i32,
    size_bytes: i64,
    created_at: DateTime<Utc>,
}
impl VideoRecord {
    fn to_domain(self) -> PortResult<Video> {
        let status = VideoStatus::from_i16(self.status).ok_or_else(|| {
            PortError::Unexpected(format!("Video {} has unknown status {}", self.id, self.status))
        })?;
        let visibility = Visibility::from_i16(self.visibility).ok_or_else(|| {
            PortError::Unexpected(format!(
                "Video {} has unknown visibility {}",
                self.id, self.visibility
            ))
        })?;

        Ok(Video {
            id: self.id,
            creator_id: self.creator_id,
            name: self.name,
            description: self.description,
            visibility,
            status,
            mime_type: self.mime_type,
            duration_secs: u32::try_from(self.duration_secs).unwrap_or(0),
            size_bytes: u64::try_from(self.size_bytes).unwrap_or(0),
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct WatchRecord {
    user_id: Uuid,
    video_id: Uuid,
    view_id: Uuid,
    started_at: DateTime<Utc>,
    bytes_streamed: i64,
}
impl WatchRecord {
    fn to_domain(self) -> WatchSession {
        WatchSession {
            user_id: self.user_id,
            video_id: self.video_id,
            view_id: self.view_id,
            started_at: self.started_at,
            bytes_streamed: u64::try_from(self.bytes_streamed).unwrap_or(0),
        }
    }
}

#[derive(FromRow)]
struct UpsertedWatchRecord {
    #[sqlx(flatten)]
    watch: WatchRecord,
    inserted: bool,
}

fn to_i64(value: u64, what: &str) -> PortResult<i64> {
    i64::try_from(value).map_err(|_| PortError::Unexpected(format!("{} {} out of range", what, value)))
}

//=========================================================================================
// `UserDirectory` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserDirectory for DbAdapter {
    async fn get_or_create_user(&self, user_id: Uuid) -> PortResult<()> {
        sqlx::query("INSERT INTO users (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}

//=========================================================================================
// `VideoRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl VideoRepository for DbAdapter {
    async fn create_video(&self, video: &Video) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO videos (id, creator_id, name, description, visibility, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(video.id)
        .bind(video.creator_id)
        .bind(&video.name)
        .bind(&video.description)
        .bind(video.visibility.as_i16())
        .bind(video.status.as_i16())
        .bind(video.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn get_video(&self, video_id: Uuid) -> PortResult<Video> {
        let record = sqlx::query_as::<_, VideoRecord>(&format!(
            "SELECT {} FROM videos WHERE id = $1",
            VIDEO_COLUMNS
        ))
        .bind(video_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Video {} not found", video_id)),
            _ => PortError::Unexpected(e.to_string()),
        })?;
        record.to_domain()
    }

    async fn list_videos(&self) -> PortResult<Vec<Video>> {
        let records = sqlx::query_as::<_, VideoRecord>(&format!(
            "SELECT {} FROM videos ORDER BY created_at DESC",
            VIDEO_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn update_settings(&self, video_id: Uuid, settings: &VideoSettings) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE videos SET name = $1, description = $2, visibility = $3, updated_at = NOW() \
             WHERE id = $4",
        )
        .bind(&settings.name)
        .bind(&settings.description)
        .bind(settings.visibility.as_i16())
        .bind(video_id)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Video {} not found", video_id)));
        }
        Ok(())
    }

    async fn begin_upload(&self, video_id: Uuid) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE videos SET status = $1, updated_at = NOW() WHERE id = $2 AND status <= $1",
        )
        .bind(VideoStatus::Uploading.as_i16())
        .bind(video_id)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }

    async fn save_ingest_state(&self, video: &Video) -> PortResult<()> {
        let duration_secs = i32::try_from(video.duration_secs).map_err(|_| {
            PortError::Unexpected(format!("Duration {} out of range", video.duration_secs))
        })?;

        sqlx::query(
            "UPDATE videos SET status = $1, mime_type = $2, duration_secs = $3, size_bytes = $4, \
             updated_at = NOW() WHERE id = $5",
        )
        .bind(video.status.as_i16())
        .bind(video.mime_type.as_deref())
        .bind(duration_secs)
        .bind(to_i64(video.size_bytes, "Size")?)
        .bind(video.id)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}

//=========================================================================================
// `WatchSessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl WatchSessionStore for DbAdapter {
    async fn get_or_start(&self, fresh: WatchSession) -> PortResult<SessionOutcome> {
        for _ in 0..SESSION_UPSERT_ATTEMPTS {
            // Inserts, or overwrites a record that targets another video. A record
            // already on this video is left alone and nothing is returned.
            let upserted = sqlx::query_as::<_, UpsertedWatchRecord>(&format!(
                "INSERT INTO watches (user_id, video_id, view_id, started_at, bytes_streamed) \
                 VALUES ($1, $2, $3, $4, 0) \
                 ON CONFLICT (user_id) DO UPDATE SET \
                     video_id = EXCLUDED.video_id, \
                     view_id = EXCLUDED.view_id, \
                     started_at = EXCLUDED.started_at, \
                     bytes_streamed = 0, \
                     updated_at = NOW() \
                 WHERE watches.video_id <> EXCLUDED.video_id \
                 RETURNING {}, (xmax = 0) AS inserted",
                WATCH_COLUMNS
            ))
            .bind(fresh.user_id)
            .bind(fresh.video_id)
            .bind(fresh.view_id)
            .bind(fresh.started_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

            if let Some(record) = upserted {
                let session = record.watch.to_domain();
                return Ok(if record.inserted {
                    SessionOutcome::Created(session)
                } else {
                    SessionOutcome::Reset(session)
                });
            }

            match self.get(fresh.user_id).await? {
                Some(session) if session.video_id == fresh.video_id => {
                    return Ok(SessionOutcome::Resumed(session));
                }
                _ => warn!(
                    "Watch record of user {} changed during upsert, retrying",
                    fresh.user_id
                ),
            }
        }

        Err(PortError::Unexpected(format!(
            "Could not settle the watch record of user {}",
            fresh.user_id
        )))
    }

    async fn get(&self, user_id: Uuid) -> PortResult<Option<WatchSession>> {
        let record = sqlx::query_as::<_, WatchRecord>(&format!(
            "SELECT {} FROM watches WHERE user_id = $1",
            WATCH_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(record.map(WatchRecord::to_domain))
    }

    async fn add_streamed_bytes(
        &self,
        user_id: Uuid,
        video_id: Uuid,
        bytes: u64,
    ) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE watches SET bytes_streamed = bytes_streamed + $1, updated_at = NOW() \
             WHERE user_id = $2 AND video_id = $3",
        )
        .bind(to_i64(bytes, "Byte count")?)
        .bind(user_id)
        .bind(video_id)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }
}

//=========================================================================================
// `ViewLedger` Trait Implementation
//=========================================================================================

#[async_trait]
impl ViewLedger for DbAdapter {
    async fn has_view(&self, view_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM views WHERE view_id = $1)")
            .bind(view_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    async fn insert_view(
        &self,
        video_id: Uuid,
        view_id: Uuid,
        counted_at: DateTime<Utc>,
    ) -> PortResult<bool> {
        let result = sqlx::query(
            "INSERT INTO views (view_id, video_id, counted_at) VALUES ($1, $2, $3) \
             ON CONFLICT (view_id) DO NOTHING",
        )
        .bind(view_id)
        .bind(video_id)
        .bind(counted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(result.rows_affected() == 1)
    }

    async fn count_views(&self, video_id: Uuid) -> PortResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM views WHERE video_id = $1")
            .bind(video_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
