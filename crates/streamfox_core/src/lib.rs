pub mod catalog;
pub mod domain;
pub mod error;
pub mod ports;
pub mod storage;
pub mod upload;
pub mod watch;

pub use catalog::{ensure_owner, ensure_playable, ensure_visible, VideoCatalog};
pub use domain::{
    ProbeInfo, RequiredWatchTime, SessionOutcome, Video, VideoSettings, VideoStatus,
    VideoSummary, ViewOutcome, Visibility, WatchConditions, WatchSession,
};
pub use error::VideoError;
pub use ports::{
    ByteStream, Clock, IdGenerator, MediaProbe, PortError, PortResult, ProbeError, SystemClock,
    ThumbnailGenerator, TimeOrderedIds, UserDirectory, VideoRepository, ViewLedger,
    WatchSessionStore,
};
pub use storage::MediaStore;
pub use upload::{ensure_complete, ProcessingLimits, UploadPipeline};
pub use watch::{InvalidThreshold, WatchIntegrityEngine, WatchPolicy};
