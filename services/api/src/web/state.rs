//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;
use streamfox_core::{UploadPipeline, UserDirectory, VideoCatalog, WatchIntegrityEngine};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserDirectory>,
    pub catalog: Arc<VideoCatalog>,
    pub pipeline: Arc<UploadPipeline>,
    pub watch: Arc<WatchIntegrityEngine>,
}
