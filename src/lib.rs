#![forbid(unsafe_code)]

//! Shared library for the playlist downloader: page extraction, per-video
//! fetching, batch orchestration and the configuration they run under.

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod logging;
pub mod metadata;
pub mod orchestrator;
pub mod sanitize;
pub mod scratch;
