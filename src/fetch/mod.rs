#![forbid(unsafe_code)]

//! Single-video fetching with ordered fallback.
//!
//! [`VideoFetcher`] first checks whether the target already exists, then tries
//! each [`FetchStrategy`] in turn. The first success wins; when every strategy
//! fails the last error is returned, since later strategies report in more
//! detail.

pub mod provider;
pub mod stream;
pub mod ytdlp;

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{info, warn};

use crate::config::{DownloadOptions, RuntimeSettings};
use crate::error::FetchError;
use crate::metadata::DownloadResult;
use crate::sanitize::sanitize;

pub use provider::{MediaFormat, MediaInfo, MediaProvider, YtDlpProvider};
pub use stream::{RetryPolicy, StreamingStrategy};
pub use ytdlp::YtDlpStrategy;

/// Extensions of incomplete downloads left by yt-dlp.
const LEFTOVER_EXTENSIONS: &[&str] = &["part", "ytdl", "tmp"];

/// One video to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub url: String,
    /// Sanitized, non-empty file stem, when the caller knows the title.
    pub title: Option<String>,
    pub folder: PathBuf,
}

impl FetchJob {
    pub fn new(url: impl Into<String>, title: Option<&str>, folder: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            title: title.map(sanitize).filter(|title| !title.is_empty()),
            folder: folder.into(),
        }
    }

    /// Label used in logs and results.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, job: &FetchJob) -> Result<DownloadResult, FetchError>;
}

/// What the playlist orchestrator needs from a fetcher.
#[async_trait]
pub trait VideoFetch: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        title: Option<&str>,
        folder: &Path,
    ) -> Result<DownloadResult, FetchError>;
}

pub struct VideoFetcher {
    strategies: Vec<Box<dyn FetchStrategy>>,
}

impl VideoFetcher {
    pub fn new(strategies: Vec<Box<dyn FetchStrategy>>) -> Self {
        Self { strategies }
    }

    /// yt-dlp subprocess first, then metadata + HTTP streaming.
    pub fn standard(settings: &RuntimeSettings, options: &DownloadOptions) -> Self {
        let primary = YtDlpStrategy::new(settings.yt_dlp.clone());
        let provider = YtDlpProvider::new(settings.yt_dlp.clone());
        let fallback = StreamingStrategy::new(
            provider,
            settings.scratch_dir.clone(),
            RetryPolicy::with_attempts(options.max_retries),
        );
        Self::new(vec![Box::new(primary), Box::new(fallback)])
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    pub async fn fetch_job(&self, job: &FetchJob) -> Result<DownloadResult, FetchError> {
        if let Some(title) = &job.title
            && let Some(existing) = existing_download(&job.folder, title)
        {
            info!("already downloaded: {}", existing.display());
            return Ok(DownloadResult::skipped(title.clone()));
        }

        let mut last_error = None;
        for strategy in &self.strategies {
            match strategy.fetch(job).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    warn!("{} failed for {}: {err}", strategy.name(), job.label());
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or(FetchError::NoStrategy))
    }
}

#[async_trait]
impl VideoFetch for VideoFetcher {
    async fn fetch(
        &self,
        url: &str,
        title: Option<&str>,
        folder: &Path,
    ) -> Result<DownloadResult, FetchError> {
        self.fetch_job(&FetchJob::new(url, title, folder)).await
    }
}

/// A finished file named `<title>.<ext>` in `folder`, if any.
pub fn existing_download(folder: &Path, title: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(folder).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|path| {
            path.is_file()
                && path.file_stem().is_some_and(|stem| stem == title)
                && path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| {
                    !LEFTOVER_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
                })
        })
}
