mod support;

use std::sync::Arc;

use chrono::Utc;
use streamfox_core::{
    RequiredWatchTime, SessionOutcome, TimeOrderedIds, Video, VideoStatus, ViewLedger,
    ViewOutcome, WatchIntegrityEngine, WatchPolicy,
};
use support::{ManualClock, MemoryDb};
use uuid::Uuid;

struct Harness {
    db: Arc<MemoryDb>,
    clock: Arc<ManualClock>,
    engine: Arc<WatchIntegrityEngine>,
}

fn harness() -> Harness {
    let db = MemoryDb::new();
    let clock = ManualClock::new();
    let engine = WatchIntegrityEngine::new(
        db.clone(),
        db.clone(),
        Arc::new(TimeOrderedIds),
        clock.clone(),
        WatchPolicy::default(),
    );
    Harness {
        db,
        clock,
        engine: Arc::new(engine),
    }
}

fn complete_video(size_bytes: u64, duration_secs: u32) -> Video {
    let mut video = Video::placeholder(Uuid::now_v7(), Uuid::now_v7(), Utc::now());
    video.status = VideoStatus::Complete;
    video.size_bytes = size_bytes;
    video.duration_secs = duration_secs;
    video
}

/// Opens the user's session on `video` the way playback does before streaming.
async fn start_watching(h: &Harness, user: Uuid, video: &Video) {
    h.engine.get_or_start_session(user, video).await.unwrap();
}

#[tokio::test]
async fn poll_after_threshold_counts_exactly_once() {
    let h = harness();
    let user = Uuid::now_v7();
    let video = complete_video(1000, 100);

    start_watching(&h, user, &video).await;
    h.engine.record_streamed_bytes(user, &video, 700).await.unwrap();
    h.clock.advance_ms(61_000);

    assert_eq!(
        h.engine.try_register_view(user, &video).await.unwrap(),
        ViewOutcome::Success
    );
    for _ in 0..5 {
        assert_eq!(
            h.engine.try_register_view(user, &video).await.unwrap(),
            ViewOutcome::Duplicate
        );
    }
    assert_eq!(h.db.count_views(video.id).await.unwrap(), 1);
}

#[tokio::test]
async fn poll_reports_missing_bytes() {
    let h = harness();
    let user = Uuid::now_v7();
    let video = complete_video(1000, 100);

    start_watching(&h, user, &video).await;
    h.engine.record_streamed_bytes(user, &video, 500).await.unwrap();
    h.clock.advance_ms(61_000);

    assert_eq!(
        h.engine.try_register_view(user, &video).await.unwrap(),
        ViewOutcome::NotStreamedEnough { remaining_bytes: 100 }
    );
    assert_eq!(h.db.count_views(video.id).await.unwrap(), 0);
}

#[tokio::test]
async fn poll_checks_time_before_bytes() {
    let h = harness();
    let user = Uuid::now_v7();
    let video = complete_video(1000, 100);

    start_watching(&h, user, &video).await;
    h.engine.record_streamed_bytes(user, &video, 100).await.unwrap();
    h.clock.advance_ms(20_000);

    assert_eq!(
        h.engine.try_register_view(user, &video).await.unwrap(),
        ViewOutcome::TimeNotPassed { remaining_ms: 40_000 }
    );
}

#[tokio::test]
async fn same_video_resumes_and_other_video_resets() {
    let h = harness();
    let user = Uuid::now_v7();
    let first = complete_video(1000, 100);
    let second = complete_video(5000, 10);

    let created = h.engine.get_or_start_session(user, &first).await.unwrap();
    assert!(matches!(created, SessionOutcome::Created(_)));
    h.engine.record_streamed_bytes(user, &first, 300).await.unwrap();

    let resumed = h.engine.get_or_start_session(user, &first).await.unwrap();
    let SessionOutcome::Resumed(session) = resumed else {
        panic!("expected resumed session");
    };
    assert_eq!(session.view_id, created.session().view_id);
    assert_eq!(session.bytes_streamed, 300);

    h.clock.advance_ms(5_000);
    let reset = h.engine.get_or_start_session(user, &second).await.unwrap();
    let SessionOutcome::Reset(session) = reset else {
        panic!("expected reset session");
    };
    assert_eq!(session.video_id, second.id);
    assert_eq!(session.bytes_streamed, 0);
    assert_ne!(session.view_id, created.session().view_id);
    assert!(session.started_at > created.session().started_at);

    // Going back is another switch; earlier progress is gone for good.
    let back = h.engine.get_or_start_session(user, &first).await.unwrap();
    assert!(matches!(back, SessionOutcome::Reset(_)));
    assert_eq!(back.session().bytes_streamed, 0);
}

#[tokio::test]
async fn switching_videos_discards_counted_view() {
    let h = harness();
    let user = Uuid::now_v7();
    let video = complete_video(1000, 100);
    let other = complete_video(1000, 100);

    start_watching(&h, user, &video).await;
    h.engine.record_streamed_bytes(user, &video, 1000).await.unwrap();
    h.clock.advance_ms(60_000);
    assert_eq!(h.engine.try_register_view(user, &video).await.unwrap(), ViewOutcome::Success);

    start_watching(&h, user, &other).await;

    // Coming back opens a new session, so a second view needs a second watch.
    assert_eq!(
        h.engine.try_register_view(user, &video).await.unwrap(),
        ViewOutcome::TimeNotPassed { remaining_ms: 60_000 }
    );
}

#[tokio::test]
async fn required_watch_time_counts_down_then_reports_counted() {
    let h = harness();
    let user = Uuid::now_v7();
    let video = complete_video(1000, 100);

    start_watching(&h, user, &video).await;
    assert_eq!(
        h.engine.required_watch_time(user, &video).await.unwrap(),
        RequiredWatchTime::Remaining { ms: 60_000 }
    );

    h.clock.advance_ms(45_000);
    assert_eq!(
        h.engine.required_watch_time(user, &video).await.unwrap(),
        RequiredWatchTime::Remaining { ms: 15_000 }
    );

    h.clock.advance_ms(30_000);
    h.engine.record_streamed_bytes(user, &video, 600).await.unwrap();
    assert_eq!(
        h.engine.required_watch_time(user, &video).await.unwrap(),
        RequiredWatchTime::Remaining { ms: 0 }
    );

    h.engine.try_register_view(user, &video).await.unwrap();
    let counted = h.engine.required_watch_time(user, &video).await.unwrap();
    assert_eq!(counted, RequiredWatchTime::AlreadyCounted);
    assert_eq!(counted.as_millis_or_sentinel(), -1);
}

#[tokio::test]
async fn zero_byte_deliveries_do_not_touch_sessions() {
    let h = harness();
    let user = Uuid::now_v7();
    let video = complete_video(1000, 100);

    h.engine.record_streamed_bytes(user, &video, 0).await.unwrap();

    assert!(h.db.watch(user).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_chunk_updates_are_not_lost() {
    let h = harness();
    let user = Uuid::now_v7();
    let video = Arc::new(complete_video(1_000_000, 100));
    start_watching(&h, user, &video).await;

    let mut handles = Vec::new();
    for _ in 0..64 {
        let engine = h.engine.clone();
        let video = video.clone();
        handles.push(tokio::spawn(async move {
            engine.record_streamed_bytes(user, &video, 250).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    assert_eq!(h.db.watch(user).unwrap().bytes_streamed, 64 * 250);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_polls_register_a_single_view() {
    let h = harness();
    let user = Uuid::now_v7();
    let video = Arc::new(complete_video(1000, 100));

    start_watching(&h, user, &video).await;
    h.engine.record_streamed_bytes(user, &video, 1000).await.unwrap();
    h.clock.advance_ms(100_000);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = h.engine.clone();
        let video = video.clone();
        handles.push(tokio::spawn(async move {
            engine.try_register_view(user, &video).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            ViewOutcome::Success => successes += 1,
            ViewOutcome::Duplicate => {}
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(h.db.count_views(video.id).await.unwrap(), 1);
}

#[tokio::test]
async fn bytes_without_a_session_are_dropped() {
    let h = harness();
    let user = Uuid::now_v7();
    let video = complete_video(1000, 100);

    let recorded = h.engine.record_streamed_bytes(user, &video, 700).await.unwrap();

    assert!(!recorded);
    assert!(h.db.watch(user).is_none());
}

#[tokio::test]
async fn late_bytes_of_previous_video_leave_current_session_alone() {
    let h = harness();
    let user = Uuid::now_v7();
    let previous = complete_video(1000, 100);
    let current = complete_video(1000, 100);

    start_watching(&h, user, &previous).await;
    start_watching(&h, user, &current).await;
    h.engine.record_streamed_bytes(user, &current, 700).await.unwrap();
    let before = h.db.watch(user).unwrap();

    // Tail of the earlier stream arriving after the switch.
    let recorded = h.engine.record_streamed_bytes(user, &previous, 50).await.unwrap();

    assert!(!recorded);
    let after = h.db.watch(user).unwrap();
    assert_eq!(after, before);
    assert_eq!(after.video_id, current.id);
    assert_eq!(after.bytes_streamed, 700);
}

#[tokio::test]
async fn required_watch_time_never_changes_the_session() {
    let h = harness();
    let user = Uuid::now_v7();
    let watching = complete_video(1000, 100);
    let other = complete_video(2000, 30);

    // No session yet: the full time is reported and none is created.
    assert_eq!(
        h.engine.required_watch_time(user, &other).await.unwrap(),
        RequiredWatchTime::Remaining { ms: 18_000 }
    );
    assert!(h.db.watch(user).is_none());

    start_watching(&h, user, &watching).await;
    h.engine.record_streamed_bytes(user, &watching, 700).await.unwrap();
    h.clock.advance_ms(10_000);
    let before = h.db.watch(user).unwrap();

    assert_eq!(
        h.engine.required_watch_time(user, &other).await.unwrap(),
        RequiredWatchTime::Remaining { ms: 18_000 }
    );
    assert_eq!(
        h.engine.required_watch_time(user, &watching).await.unwrap(),
        RequiredWatchTime::Remaining { ms: 50_000 }
    );
    assert_eq!(h.db.watch(user).unwrap(), before);
}
