pub mod db;
pub mod ffprobe;
pub mod thumbnail;

pub use db::DbAdapter;
pub use ffprobe::FfprobeAdapter;
pub use thumbnail::FfmpegThumbnailAdapter;
