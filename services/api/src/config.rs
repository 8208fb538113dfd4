//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use streamfox_core::{ProcessingLimits, WatchPolicy};
use tracing::Level;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 4 * 1024 * 1024 * 1024;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub data_root: PathBuf,
    pub ffprobe_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub watch_policy: WatchPolicy,
    pub processing_limits: ProcessingLimits,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Media Storage and Tooling Settings ---
        let data_root = std::env::var("DATA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let ffprobe_path = std::env::var("FFPROBE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ffprobe"));
        let ffmpeg_path = std::env::var("FFMPEG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("ffmpeg"));

        // --- Load Ingestion and Watch Policy ---
        let threshold = parse_var("WATCH_THRESHOLD", streamfox_core::domain::DEFAULT_WATCH_THRESHOLD)?;
        let watch_policy = WatchPolicy::new(threshold)
            .map_err(|e| ConfigError::InvalidValue("WATCH_THRESHOLD".to_string(), e.to_string()))?;

        let defaults = ProcessingLimits::default();
        let max_concurrent = parse_var("MAX_CONCURRENT_PROCESSING", defaults.max_concurrent)?;
        let timeout_secs = parse_var("PROCESSING_TIMEOUT_SECS", defaults.step_timeout.as_secs())?;
        if max_concurrent == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_CONCURRENT_PROCESSING".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "PROCESSING_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            data_root,
            ffprobe_path,
            ffmpeg_path,
            watch_policy,
            processing_limits: ProcessingLimits {
                max_concurrent,
                step_timeout: Duration::from_secs(timeout_secs),
            },
            max_upload_bytes,
        })
    }
}

/// Reads an optional variable, falling back to `default` when it is unset.
fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_uses_default_when_unset() {
        let value: u64 = parse_var("STREAMFOX_TEST_SURELY_UNSET", 17).unwrap();
        assert_eq!(value, 17);
    }

    #[test]
    fn parse_var_reports_the_variable_name() {
        std::env::set_var("STREAMFOX_TEST_BAD_NUMBER", "twelve");
        let err = parse_var::<u64>("STREAMFOX_TEST_BAD_NUMBER", 1).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "STREAMFOX_TEST_BAD_NUMBER"));
    }
}
