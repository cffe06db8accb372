#![forbid(unsafe_code)]

//! Failure taxonomy shared by the extractor, the fetcher and the orchestrators.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::metadata::BatchResult;

/// Errors raised while reading a playlist page.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("could not start a browser session at {endpoint}: {message}")]
    Session { endpoint: String, message: String },

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// The playlist list never rendered within the wait budget.
    #[error("playlist items did not render within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("browser command failed: {0}")]
    Browser(String),
}

/// Errors raised while fetching a single video.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {output}")]
    Subprocess {
        program: String,
        status: ExitStatus,
        output: String,
    },

    #[error("metadata resolution failed after {attempts} attempt(s): {message}")]
    Metadata { attempts: u32, message: String },

    #[error("no suitable format found for {url}")]
    FormatNotFound { url: String },

    #[error("stream interrupted after {written} bytes: {source}")]
    Stream {
        written: u64,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no download strategy configured")]
    NoStrategy,
}

/// Errors that end one playlist run. The multi-playlist loop records them and
/// moves on.
#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("could not prepare {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not serialize playlist metadata: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A video failed while `continue_on_error` was off.
    #[error("stopped after \"{title}\" failed: {source}")]
    Aborted {
        title: String,
        partial: BatchResult,
        #[source]
        source: FetchError,
    },
}
