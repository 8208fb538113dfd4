//! crates/streamfox_core/src/watch.rs
//!
//! Decides when a playback session counts as a genuine view.
//!
//! A user has one watch session at a time. Streamed bytes accumulate on it, and
//! a "still watching" poll registers exactly one view once the session has both
//! streamed and been open for the threshold fraction of the video.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    RequiredWatchTime, SessionOutcome, Video, ViewOutcome, WatchConditions, WatchSession,
    DEFAULT_WATCH_THRESHOLD,
};
use crate::ports::{Clock, IdGenerator, PortResult, ViewLedger, WatchSessionStore};

#[derive(Debug, thiserror::Error)]
#[error("Watch threshold must be within (0, 1], got {0}")]
pub struct InvalidThreshold(pub f64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchPolicy {
    threshold: f64,
}

impl WatchPolicy {
    pub fn new(threshold: f64) -> Result<Self, InvalidThreshold> {
        if threshold > 0.0 && threshold <= 1.0 {
            Ok(Self { threshold })
        } else {
            Err(InvalidThreshold(threshold))
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for WatchPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_WATCH_THRESHOLD,
        }
    }
}

pub struct WatchIntegrityEngine {
    sessions: Arc<dyn WatchSessionStore>,
    ledger: Arc<dyn ViewLedger>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    policy: WatchPolicy,
}

impl WatchIntegrityEngine {
    pub fn new(
        sessions: Arc<dyn WatchSessionStore>,
        ledger: Arc<dyn ViewLedger>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        policy: WatchPolicy,
    ) -> Self {
        Self {
            sessions,
            ledger,
            ids,
            clock,
            policy,
        }
    }

    /// Returns the user's session for `video`, starting a fresh one if the user
    /// had none or was watching something else.
    pub async fn get_or_start_session(
        &self,
        user_id: Uuid,
        video: &Video,
    ) -> PortResult<SessionOutcome> {
        let fresh = WatchSession::start(user_id, video.id, self.ids.next_id(), self.clock.now());
        let outcome = self.sessions.get_or_start(fresh).await?;

        match &outcome {
            SessionOutcome::Created(s) => {
                debug!("User {} started watching video {} (view {})", user_id, video.id, s.view_id)
            }
            SessionOutcome::Reset(s) => {
                debug!("User {} switched to video {} (view {})", user_id, video.id, s.view_id)
            }
            SessionOutcome::Resumed(_) => {}
        }
        Ok(outcome)
    }

    /// Adds `bytes` delivered to `user_id` for `video` to their session.
    ///
    /// Never starts or switches a session. Returns `false` when the user's
    /// session no longer targets `video`, in which case the bytes are dropped.
    pub async fn record_streamed_bytes(
        &self,
        user_id: Uuid,
        video: &Video,
        bytes: u64,
    ) -> PortResult<bool> {
        if bytes == 0 {
            return Ok(true);
        }

        let recorded = self
            .sessions
            .add_streamed_bytes(user_id, video.id, bytes)
            .await?;

        if !recorded {
            debug!(
                "Dropped {} streamed bytes of video {} for user {}: session moved on",
                bytes, video.id, user_id
            );
        }
        Ok(recorded)
    }

    pub fn remaining(&self, session: &WatchSession, video: &Video) -> WatchConditions {
        WatchConditions::compute(session, video, self.policy.threshold, self.clock.now())
    }

    /// Handles a "still watching" poll. Idempotent: once the threshold is
    /// crossed, exactly one call returns `Success` and later calls `Duplicate`.
    pub async fn try_register_view(&self, user_id: Uuid, video: &Video) -> PortResult<ViewOutcome> {
        let session = self.get_or_start_session(user_id, video).await?.into_session();

        if self.ledger.has_view(session.view_id).await? {
            return Ok(ViewOutcome::Duplicate);
        }

        let conditions = self.remaining(&session, video);
        if conditions.remaining_time_ms > 0 {
            return Ok(ViewOutcome::TimeNotPassed {
                remaining_ms: conditions.remaining_time_ms,
            });
        }
        if conditions.remaining_bytes > 0 {
            return Ok(ViewOutcome::NotStreamedEnough {
                remaining_bytes: conditions.remaining_bytes,
            });
        }

        let inserted = self
            .ledger
            .insert_view(video.id, session.view_id, self.clock.now())
            .await?;

        if inserted {
            info!("Counted view {} of video {} for user {}", session.view_id, video.id, user_id);
            Ok(ViewOutcome::Success)
        } else {
            // A concurrent poll won the insert.
            Ok(ViewOutcome::Duplicate)
        }
    }

    /// How long the user still has to keep watching before a poll can count,
    /// or `AlreadyCounted` if the active session's view is already registered.
    ///
    /// Read-only: without a session on `video` the full watch time is reported
    /// and nothing is started or reset.
    pub async fn required_watch_time(
        &self,
        user_id: Uuid,
        video: &Video,
    ) -> PortResult<RequiredWatchTime> {
        let session = match self.sessions.get(user_id).await? {
            Some(session) if session.video_id == video.id => session,
            _ => {
                let untouched = WatchConditions::unstarted(video, self.policy.threshold);
                return Ok(RequiredWatchTime::Remaining {
                    ms: untouched.remaining_time_ms,
                });
            }
        };

        if self.ledger.has_view(session.view_id).await? {
            return Ok(RequiredWatchTime::AlreadyCounted);
        }

        let conditions = self.remaining(&session, video);
        Ok(RequiredWatchTime::Remaining {
            ms: conditions.remaining_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_rejects_out_of_range_thresholds() {
        assert!(WatchPolicy::new(0.0).is_err());
        assert!(WatchPolicy::new(-0.1).is_err());
        assert!(WatchPolicy::new(1.5).is_err());
        assert!(WatchPolicy::new(f64::NAN).is_err());
        assert_eq!(WatchPolicy::new(1.0).unwrap().threshold(), 1.0);
        assert_eq!(WatchPolicy::default().threshold(), 0.6);
    }
}
