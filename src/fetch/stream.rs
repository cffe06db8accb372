#![forbid(unsafe_code)]

//! Fallback strategy: resolve metadata, pick a format and stream it to disk.

use std::cmp::Ordering;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use log::{info, warn};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;

use super::provider::{ByteStream, MediaFormat, MediaInfo, MediaProvider};
use super::{FetchJob, FetchStrategy};
use crate::error::FetchError;
use crate::metadata::DownloadResult;
use crate::sanitize::sanitize;

/// Stem used when neither the caller nor the metadata provide a usable title.
const UNTITLED: &str = "untitled";

/// Metadata resolution attempts with linear backoff: attempt `n` is followed
/// by a pause of `backoff * n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Self::default()
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

pub struct StreamingStrategy<P> {
    provider: P,
    workdir: PathBuf,
    retry: RetryPolicy,
}

impl<P: MediaProvider> StreamingStrategy<P> {
    /// `workdir` receives whatever the provider leaves behind while resolving.
    pub fn new(provider: P, workdir: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            workdir: workdir.into(),
            retry,
        }
    }

    pub async fn resolve_with_retry(&self, url: &str) -> Result<MediaInfo, FetchError> {
        let attempts = self.retry.attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.provider.resolve(url, &self.workdir).await {
                Ok(info) => return Ok(info),
                Err(err) => {
                    warn!("metadata attempt {attempt}/{attempts} failed for {url}: {err:#}");
                    last_error = format!("{err:#}");
                    if attempt < attempts {
                        sleep(self.retry.delay_after(attempt)).await;
                    }
                }
            }
        }
        Err(FetchError::Metadata {
            attempts,
            message: last_error,
        })
    }
}

fn has_rank(format: &MediaFormat) -> bool {
    format.height.is_some() || format.tbr.is_some()
}

fn by_rank(a: &&MediaFormat, b: &&MediaFormat) -> Ordering {
    a.height
        .unwrap_or(0)
        .cmp(&b.height.unwrap_or(0))
        .then(a.tbr.unwrap_or(0.0).total_cmp(&b.tbr.unwrap_or(0.0)))
}

/// Leading number of a label such as "720p60".
fn label_number(format: &MediaFormat) -> u32 {
    format
        .quality_label
        .as_deref()
        .map(|label| {
            label
                .trim()
                .chars()
                .take_while(|ch| ch.is_ascii_digit())
                .collect::<String>()
        })
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

fn is_combined(format: &MediaFormat) -> bool {
    format.has_video && format.has_audio
}

/// Ordering over every format: ranked before unranked, then height and
/// bitrate, then combined before single-track, then the numeric label.
fn by_fallback(a: &&MediaFormat, b: &&MediaFormat) -> Ordering {
    has_rank(a)
        .cmp(&has_rank(b))
        .then_with(|| by_rank(a, b))
        .then_with(|| is_combined(a).cmp(&is_combined(b)))
        .then_with(|| label_number(a).cmp(&label_number(b)))
}

/// Best ranked combined format, else the best format of any kind. Among
/// formats without height or bitrate, combined ones with the largest numeric
/// quality label win. `None` only when there are no formats at all.
pub fn select_format(formats: &[MediaFormat]) -> Option<&MediaFormat> {
    formats
        .iter()
        .filter(|format| is_combined(format) && has_rank(format))
        .max_by(by_rank)
        .or_else(|| formats.iter().max_by(by_fallback))
}

/// Writes `stream` to `target`. Any failure removes the partial file.
pub async fn stream_to_file(
    mut stream: ByteStream,
    target: &Path,
    total: Option<u64>,
) -> Result<u64, FetchError> {
    let io_error = |source: io::Error| FetchError::Io {
        path: target.to_path_buf(),
        source,
    };

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    let mut file = File::create(target).await.map_err(io_error)?;

    let mut written = 0u64;
    let mut reported_decile = 0u64;
    let outcome = loop {
        let chunk = match stream.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(source)) => break Err(FetchError::Stream { written, source }),
            None => break file.flush().await.map_err(io_error),
        };
        if let Err(source) = file.write_all(&chunk).await {
            break Err(io_error(source));
        }
        written += chunk.len() as u64;

        if let Some(total) = total.filter(|total| *total > 0) {
            let decile = (written * 10 / total).min(10);
            if decile > reported_decile {
                reported_decile = decile;
                info!(
                    "  {}% ({:.1}/{:.1} MB)",
                    decile * 10,
                    written as f64 / 1_048_576.0,
                    total as f64 / 1_048_576.0
                );
            }
        }
    };
    drop(file);

    match outcome {
        Ok(()) => Ok(written),
        Err(err) => {
            if let Err(remove_err) = tokio::fs::remove_file(target).await
                && remove_err.kind() != io::ErrorKind::NotFound
            {
                warn!("could not remove partial file {}: {remove_err}", target.display());
            }
            Err(err)
        }
    }
}

#[async_trait]
impl<P: MediaProvider> FetchStrategy for StreamingStrategy<P> {
    fn name(&self) -> &'static str {
        "stream"
    }

    async fn fetch(&self, job: &FetchJob) -> Result<DownloadResult, FetchError> {
        info!("trying streaming fallback for {}", job.label());
        let info = self.resolve_with_retry(&job.url).await?;

        let title = match &job.title {
            Some(title) => title.clone(),
            None => Some(sanitize(&info.title))
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
        };
        let target = job.folder.join(format!("{title}.mp4"));
        if target.exists() {
            info!("already downloaded: {}", target.display());
            return Ok(DownloadResult::skipped(title));
        }

        let format = select_format(&info.formats).ok_or_else(|| FetchError::FormatNotFound {
            url: job.url.clone(),
        })?;
        info!(
            "selected format {} ({})",
            format.format_id,
            format.quality_label.as_deref().unwrap_or("unknown quality")
        );

        let stream = self
            .provider
            .open_stream(format)
            .await
            .map_err(|err| FetchError::Stream {
                written: 0,
                source: io::Error::other(format!("{err:#}")),
            })?;
        let written = stream_to_file(stream, &target, format.content_length).await?;

        info!("downloaded {} ({written} bytes)", target.display());
        Ok(DownloadResult::downloaded(title))
    }
}
