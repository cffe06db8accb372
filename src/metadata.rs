#![forbid(unsafe_code)]

//! Records produced by extraction, results produced by downloads, and the
//! `playlist_info.json` document written next to the videos.
//!
//! Field names of the serialized document are camelCase and stable; other
//! tools read them.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PlaylistError;

pub const UNKNOWN_PLAYLIST: &str = "Unknown Playlist";
pub const UNKNOWN_CHANNEL: &str = "Unknown";
pub const PLAYLIST_DOCUMENT_FILE: &str = "playlist_info.json";

/// Order in which the videos of a playlist are downloaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Keep the order the page rendered.
    #[default]
    Playlist,
    /// Oldest first. Playlists render newest first, so this reverses the list.
    Upload,
    /// Reverse of the rendered order.
    Reverse,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Playlist => "playlist",
            SortOrder::Upload => "upload",
            SortOrder::Reverse => "reverse",
        }
    }
}

/// One video as rendered in the playlist page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    /// 1-based render position at extraction time.
    pub playlist_index: usize,
    pub url: String,
    /// Raw link text, not sanitized.
    pub title: String,
    /// Relative date such as "2 years ago", when the page showed one.
    pub upload_info: Option<String>,
    /// 1-based position after sorting; unset until the orchestrator sorts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub title: String,
    pub channel: String,
}

impl Default for PlaylistInfo {
    fn default() -> Self {
        Self {
            title: UNKNOWN_PLAYLIST.to_string(),
            channel: UNKNOWN_CHANNEL.to_string(),
        }
    }
}

/// Outcome of a single video fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub success: bool,
    /// The target already existed; nothing was transferred.
    pub skipped: bool,
    pub title: String,
}

impl DownloadResult {
    pub fn downloaded(title: impl Into<String>) -> Self {
        Self {
            success: true,
            skipped: false,
            title: title.into(),
        }
    }

    pub fn skipped(title: impl Into<String>) -> Self {
        Self {
            success: true,
            skipped: true,
            title: title.into(),
        }
    }
}

/// Counters for one playlist run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub success_count: usize,
    pub skipped_count: usize,
    pub fail_count: usize,
    pub total_videos: usize,
    pub playlist_folder: PathBuf,
}

impl BatchResult {
    pub fn new(total_videos: usize, playlist_folder: PathBuf) -> Self {
        Self {
            total_videos,
            playlist_folder,
            ..Self::default()
        }
    }

    pub fn record(&mut self, result: &DownloadResult) {
        match (result.success, result.skipped) {
            (true, true) => self.skipped_count += 1,
            (true, false) => self.success_count += 1,
            (false, _) => self.fail_count += 1,
        }
    }

    pub fn record_failure(&mut self) {
        self.fail_count += 1;
    }

    pub fn processed(&self) -> usize {
        self.success_count + self.skipped_count + self.fail_count
    }

    /// True once every video has been accounted for.
    pub fn is_complete(&self) -> bool {
        self.processed() == self.total_videos
    }
}

/// Persisted once per playlist folder, before any download starts. It is not
/// rewritten afterwards, so it describes the plan rather than the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistMetadataDocument {
    pub title: String,
    pub channel: String,
    pub url: String,
    pub total_videos: usize,
    pub extracted_at: DateTime<Utc>,
    /// Extraction order.
    pub videos: Vec<VideoRecord>,
    pub sort_order: SortOrder,
    /// Download order, with `downloadIndex` set.
    pub sorted_videos: Vec<VideoRecord>,
}

impl PlaylistMetadataDocument {
    pub fn new(
        info: &PlaylistInfo,
        url: &str,
        videos: &[VideoRecord],
        sort_order: SortOrder,
        sorted_videos: &[VideoRecord],
    ) -> Self {
        Self {
            title: info.title.clone(),
            channel: info.channel.clone(),
            url: url.to_string(),
            total_videos: sorted_videos.len(),
            extracted_at: Utc::now(),
            videos: videos.to_vec(),
            sort_order,
            sorted_videos: sorted_videos.to_vec(),
        }
    }

    /// Writes the document into `folder` through a temporary file so readers
    /// never observe a half-written JSON file.
    pub fn write_to(&self, folder: &Path) -> Result<PathBuf, PlaylistError> {
        let path = folder.join(PLAYLIST_DOCUMENT_FILE);
        let tmp_path = path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(self)?;

        fs::write(&tmp_path, payload).map_err(|source| PlaylistError::Storage {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &path).map_err(|source| PlaylistError::Storage {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// What one playlist run produced.
#[derive(Debug, Clone)]
pub enum PlaylistOutcome {
    Completed {
        info: PlaylistInfo,
        result: BatchResult,
    },
    /// Extraction found no videos; nothing was created or downloaded.
    Empty { info: PlaylistInfo },
}

/// One entry of the multi-playlist report.
#[derive(Debug, Clone)]
pub struct PlaylistReport {
    pub url: String,
    pub status: PlaylistStatus,
}

#[derive(Debug, Clone)]
pub enum PlaylistStatus {
    Succeeded(PlaylistOutcome),
    Failed { error: String },
}

impl PlaylistReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, PlaylistStatus::Succeeded(_))
    }
}

/// Totals across every playlist of a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub total_playlists: usize,
    pub successful_playlists: usize,
    pub failed_playlists: usize,
    pub total_videos_downloaded: usize,
    pub total_videos_skipped: usize,
    pub total_videos_failed: usize,
    pub results: Vec<PlaylistReport>,
}

impl BatchSummary {
    pub fn new(total_playlists: usize) -> Self {
        Self {
            total_playlists,
            ..Self::default()
        }
    }

    pub fn push_success(&mut self, url: &str, outcome: PlaylistOutcome) {
        if let PlaylistOutcome::Completed { result, .. } = &outcome {
            self.total_videos_downloaded += result.success_count;
            self.total_videos_skipped += result.skipped_count;
            self.total_videos_failed += result.fail_count;
        }
        self.successful_playlists += 1;
        self.results.push(PlaylistReport {
            url: url.to_string(),
            status: PlaylistStatus::Succeeded(outcome),
        });
    }

    pub fn push_failure(&mut self, url: &str, error: String) {
        self.failed_playlists += 1;
        self.results.push(PlaylistReport {
            url: url.to_string(),
            status: PlaylistStatus::Failed { error },
        });
    }
}
