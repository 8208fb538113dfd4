//! services/api/src/lib.rs
//!
//! HTTP surface of the video service: configuration, infrastructure adapters
//! for the core ports, and the Axum handlers.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
