pub mod errors;
pub mod middleware;
pub mod playback;
pub mod protocol;
pub mod range;
pub mod rest;
pub mod state;

pub use middleware::require_user;
pub use playback::{required_watch_time_handler, still_watching_handler, stream_video_handler};
pub use rest::{
    create_video_handler, get_thumbnail_handler, get_video_handler, list_videos_handler,
    update_video_handler, upload_video_handler,
};
