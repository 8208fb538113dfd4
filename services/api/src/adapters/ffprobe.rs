//! services/api/src/adapters/ffprobe.rs
//!
//! This module contains the adapter for `ffprobe`. It implements the
//! `MediaProbe` port from the `core` crate.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use streamfox_core::domain::ProbeInfo;
use streamfox_core::ports::{MediaProbe, ProbeError};
use tokio::process::Command;
use tracing::debug;

//=========================================================================================
// ffprobe JSON Output
//=========================================================================================

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    format_name: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

/// Maps an ffprobe `format_name` (a comma separated list of demuxer names) to the
/// MIME type the file is served with.
fn mime_type_for(format_name: &str) -> Option<&'static str> {
    let names: Vec<&str> = format_name.split(',').map(str::trim).collect();
    let has = |name: &str| names.iter().any(|n| *n == name);

    if has("mp4") || has("mov") {
        Some("video/mp4")
    } else if has("webm") {
        Some("video/webm")
    } else if has("matroska") {
        Some("video/x-matroska")
    } else if has("ogg") {
        Some("video/ogg")
    } else {
        None
    }
}

/// Parse ffprobe JSON output into `ProbeInfo`.
fn parse_probe_output(json: &str) -> Result<ProbeInfo, ProbeError> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| ProbeError::Failed(format!("Failed to parse ffprobe JSON: {}", e)))?;

    let format = output
        .format
        .ok_or_else(|| ProbeError::UnsupportedFormat("no container detected".to_string()))?;

    let format_name = format.format_name.unwrap_or_default();
    let mime_type = mime_type_for(&format_name)
        .ok_or_else(|| ProbeError::UnsupportedFormat(format!("container '{}'", format_name)))?;

    if !output
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("video"))
    {
        return Err(ProbeError::UnsupportedFormat("no video stream".to_string()));
    }

    let duration = format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| ProbeError::UnsupportedFormat("missing or zero duration".to_string()))?;

    Ok(ProbeInfo {
        mime_type: mime_type.to_string(),
        duration_secs: duration.round().min(f64::from(u32::MAX)) as u32,
    })
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `MediaProbe` port by running `ffprobe`.
#[derive(Clone)]
pub struct FfprobeAdapter {
    ffprobe_path: PathBuf,
}

impl FfprobeAdapter {
    /// Creates a new `FfprobeAdapter`.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }
}

#[async_trait]
impl MediaProbe for FfprobeAdapter {
    async fn probe(&self, media_path: &Path) -> Result<ProbeInfo, ProbeError> {
        debug!("Probing {}", media_path.display());

        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(media_path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::Failed(format!("Failed to run ffprobe: {}", e)))?;

        // ffprobe exits non-zero when it cannot make sense of the input at all.
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::UnsupportedFormat(stderr.trim().to_string()));
        }

        let json = String::from_utf8(output.stdout)
            .map_err(|_| ProbeError::Failed("ffprobe output was not valid UTF-8".to_string()))?;

        parse_probe_output(&json)
    }
}
