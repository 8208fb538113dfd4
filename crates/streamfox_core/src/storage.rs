//! crates/streamfox_core/src/storage.rs
//!
//! On-disk layout of uploaded media: one directory per video holding the raw
//! media artifact and its thumbnail.

use futures::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ports::ByteStream;

const MEDIA_FILE: &str = "video";
const THUMBNAIL_FILE: &str = "thumbnail";

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            root: data_root.into(),
        }
    }

    pub fn video_dir(&self, video_id: Uuid) -> PathBuf {
        self.root.join("videos").join(video_id.to_string())
    }

    pub fn media_path(&self, video_id: Uuid) -> PathBuf {
        self.video_dir(video_id).join(MEDIA_FILE)
    }

    pub fn thumbnail_path(&self, video_id: Uuid) -> PathBuf {
        self.video_dir(video_id).join(THUMBNAIL_FILE)
    }

    /// Copies `stream` chunk by chunk into the video's media file and returns the
    /// number of bytes written.
    ///
    /// The whole payload is never held in memory. If the stream yields an error,
    /// a write fails, or this future is dropped halfway, the partial file is
    /// removed before control returns.
    pub async fn write_media(&self, video_id: Uuid, mut stream: ByteStream) -> io::Result<u64> {
        tokio::fs::create_dir_all(self.video_dir(video_id)).await?;

        let path = self.media_path(video_id);
        let mut partial = PartialFile::new(path.clone());
        let mut file = tokio::fs::File::create(&path).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| io::Error::new(io::ErrorKind::ConnectionAborted, e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        partial.keep();
        debug!("Stored {} bytes at {}", written, path.display());
        Ok(written)
    }

    /// Size of the stored media file as it is on disk.
    pub async fn media_size(&self, video_id: Uuid) -> io::Result<u64> {
        Ok(tokio::fs::metadata(self.media_path(video_id)).await?.len())
    }

    pub async fn remove_media(&self, video_id: Uuid) -> io::Result<()> {
        remove_if_present(&self.media_path(video_id)).await
    }
}

async fn remove_if_present(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Deletes the file on drop unless `keep` was called.
struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn keep(&mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => warn!("Removed partial upload at {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove partial upload at {}: {}", path.display(), e),
            }
        }
    }
}
