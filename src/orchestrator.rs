#![forbid(unsafe_code)]

//! Playlist and multi-playlist batch runs.
//!
//! Everything is sequential: one browser session, one download and one
//! playlist at a time, with configurable pauses in between.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use tokio::time::sleep;

use crate::config::DownloadOptions;
use crate::error::PlaylistError;
use crate::extract::{ExtractOptions, PlaylistSource};
use crate::fetch::VideoFetch;
use crate::metadata::{
    BatchResult, BatchSummary, PlaylistMetadataDocument, PlaylistOutcome, SortOrder,
    UNKNOWN_PLAYLIST, VideoRecord,
};
use crate::sanitize::sanitize;
use crate::scratch::ScratchDir;

/// Reorders `videos` for download and stamps `download_index` with the
/// 1-based position in the new order.
pub fn sort_videos(mut videos: Vec<VideoRecord>, order: SortOrder) -> Vec<VideoRecord> {
    match order {
        SortOrder::Playlist => {}
        // Playlists render newest first; reversing approximates oldest first.
        SortOrder::Upload | SortOrder::Reverse => videos.reverse(),
    }
    for (position, video) in videos.iter_mut().enumerate() {
        video.download_index = Some(position + 1);
    }
    videos
}

impl From<&DownloadOptions> for ExtractOptions {
    fn from(options: &DownloadOptions) -> Self {
        Self {
            headless: options.headless,
            timeout: options.timeout(),
            max_videos: options.max_videos,
        }
    }
}

/// Folder name for a playlist title, never empty.
pub fn playlist_folder_name(title: &str) -> String {
    let name = sanitize(title);
    if name.is_empty() {
        UNKNOWN_PLAYLIST.to_string()
    } else {
        name
    }
}

pub struct PlaylistDownloader<S, F> {
    source: S,
    fetcher: F,
    download_root: PathBuf,
    scratch: ScratchDir,
}

impl<S: PlaylistSource, F: VideoFetch> PlaylistDownloader<S, F> {
    pub fn new(source: S, fetcher: F, download_root: impl Into<PathBuf>, scratch: ScratchDir) -> Self {
        Self {
            source,
            fetcher,
            download_root: download_root.into(),
            scratch,
        }
    }

    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    /// Extracts, sorts and downloads one playlist. The scratch directory is
    /// emptied afterwards whatever the outcome.
    pub async fn download_playlist(
        &self,
        url: &str,
        options: &DownloadOptions,
    ) -> Result<PlaylistOutcome, PlaylistError> {
        let outcome = self.run_playlist(url, options).await;
        let removed = self.scratch.cleanup();
        if removed > 0 {
            debug!("removed {removed} scratch file(s)");
        }
        outcome
    }

    async fn run_playlist(
        &self,
        url: &str,
        options: &DownloadOptions,
    ) -> Result<PlaylistOutcome, PlaylistError> {
        self.scratch
            .ensure()
            .map_err(|source| PlaylistError::Storage {
                path: self.scratch.path().to_path_buf(),
                source,
            })?;

        info!("extracting playlist {url}");
        let extraction = self.source.extract(url, &ExtractOptions::from(options)).await?;
        let info = extraction.playlist_info;
        if extraction.videos.is_empty() {
            warn!("no videos found in {url}");
            return Ok(PlaylistOutcome::Empty { info });
        }

        let sorted = sort_videos(extraction.videos.clone(), options.sort_order);
        let folder = if options.create_playlist_folder {
            self.download_root.join(playlist_folder_name(&info.title))
        } else {
            self.download_root.clone()
        };
        fs::create_dir_all(&folder).map_err(|source| PlaylistError::Storage {
            path: folder.clone(),
            source,
        })?;

        if options.create_playlist_folder {
            let document = PlaylistMetadataDocument::new(
                &info,
                url,
                &extraction.videos,
                options.sort_order,
                &sorted,
            );
            let path = document.write_to(&folder)?;
            info!("saved playlist metadata to {}", path.display());
        }

        info!(
            "downloading {} videos from \"{}\" ({} order) into {}",
            sorted.len(),
            info.title,
            options.sort_order.as_str(),
            folder.display()
        );

        let total = sorted.len();
        let mut result = BatchResult::new(total, folder.clone());
        for (position, video) in sorted.iter().enumerate() {
            info!("[{}/{}] {}", position + 1, total, video.title);
            match self
                .fetcher
                .fetch(&video.url, Some(&video.title), &folder)
                .await
            {
                Ok(download) => {
                    if download.skipped {
                        info!("skipped {} (already downloaded)", download.title);
                    }
                    result.record(&download);
                }
                Err(err) => {
                    error!("failed to download {}: {err}", video.url);
                    result.record_failure();
                    if !options.continue_on_error {
                        return Err(PlaylistError::Aborted {
                            title: video.title.clone(),
                            partial: result,
                            source: err,
                        });
                    }
                }
            }

            if position + 1 < total {
                sleep(options.delay_between_downloads()).await;
            }
        }

        info!(
            "playlist done: {} downloaded, {} skipped, {} failed",
            result.success_count, result.skipped_count, result.fail_count
        );
        Ok(PlaylistOutcome::Completed { info, result })
    }

    /// Runs every URL in order, isolating failures per playlist unless
    /// `continue_on_playlist_error` is off.
    pub async fn download_multiple_playlists(
        &self,
        urls: &[String],
        options: &DownloadOptions,
    ) -> BatchSummary {
        let mut summary = BatchSummary::new(urls.len());
        for (position, url) in urls.iter().enumerate() {
            info!("playlist {}/{}: {url}", position + 1, urls.len());
            match self.download_playlist(url, options).await {
                Ok(outcome) => summary.push_success(url, outcome),
                Err(err) => {
                    error!("playlist {url} failed: {err}");
                    summary.push_failure(url, err.to_string());
                    if !options.continue_on_playlist_error {
                        warn!("stopping batch after failed playlist");
                        break;
                    }
                }
            }

            if position + 1 < urls.len() {
                sleep(options.delay_between_playlists()).await;
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExtractError, FetchError};
    use crate::extract::Extraction;
    use crate::metadata::{DownloadResult, PLAYLIST_DOCUMENT_FILE, PlaylistInfo, PlaylistStatus};
    use anyhow::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    fn videos(count: usize, prefix: &str) -> Vec<VideoRecord> {
        (1..=count)
            .map(|n| VideoRecord {
                playlist_index: n,
                url: format!("https://www.youtube.com/watch?v={prefix}{n}"),
                title: format!("{prefix} {n}"),
                upload_info: None,
                download_index: None,
            })
            .collect()
    }

    #[derive(Default)]
    struct FakeSource {
        playlists: HashMap<String, (String, Vec<VideoRecord>)>,
        visited: Mutex<Vec<String>>,
    }

    impl FakeSource {
        fn with(mut self, url: &str, title: &str, videos: Vec<VideoRecord>) -> Self {
            self.playlists
                .insert(url.to_string(), (title.to_string(), videos));
            self
        }
    }

    #[async_trait]
    impl PlaylistSource for FakeSource {
        async fn extract(
            &self,
            url: &str,
            _options: &ExtractOptions,
        ) -> Result<Extraction, ExtractError> {
            self.visited.lock().push(url.to_string());
            let (title, videos) =
                self.playlists
                    .get(url)
                    .cloned()
                    .ok_or_else(|| ExtractError::Navigation {
                        url: url.to_string(),
                        message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
                    })?;
            Ok(Extraction {
                playlist_info: PlaylistInfo {
                    title,
                    channel: "Channel".to_string(),
                },
                videos,
            })
        }
    }

    #[derive(Default)]
    struct FakeFetcher {
        failing: HashSet<String>,
        present: HashSet<String>,
        fetched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VideoFetch for FakeFetcher {
        async fn fetch(
            &self,
            url: &str,
            title: Option<&str>,
            folder: &Path,
        ) -> Result<DownloadResult, FetchError> {
            let title = title.unwrap_or(url).to_string();
            self.fetched.lock().push(title.clone());
            if self.failing.contains(&title) {
                return Err(FetchError::FormatNotFound { url: url.to_string() });
            }
            if self.present.contains(&title) {
                return Ok(DownloadResult::skipped(title));
            }
            fs::write(folder.join(format!("{title}.mp4")), b"video").map_err(|source| {
                FetchError::Io {
                    path: folder.to_path_buf(),
                    source,
                }
            })?;
            Ok(DownloadResult::downloaded(title))
        }
    }

    fn quick_options() -> DownloadOptions {
        DownloadOptions {
            delay_between_downloads_ms: 0,
            delay_between_playlists_ms: 0,
            ..DownloadOptions::default()
        }
    }

    fn downloader(
        source: FakeSource,
        fetcher: FakeFetcher,
    ) -> Result<(TempDir, PlaylistDownloader<FakeSource, FakeFetcher>)> {
        let dir = tempdir()?;
        let root = dir.path().join("downloads");
        let scratch = ScratchDir::new(dir.path().join(".temp"));
        Ok((dir, PlaylistDownloader::new(source, fetcher, root, scratch)))
    }

    #[test]
    fn playlist_order_is_identity() {
        let sorted = sort_videos(videos(4, "v"), SortOrder::Playlist);
        let indices: Vec<usize> = sorted.iter().map(|v| v.playlist_index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        assert!(
            sorted
                .iter()
                .enumerate()
                .all(|(position, v)| v.download_index == Some(position + 1))
        );
    }

    #[test]
    fn upload_and_reverse_are_exact_reversals() {
        for order in [SortOrder::Upload, SortOrder::Reverse] {
            let sorted = sort_videos(videos(5, "v"), order);
            let indices: Vec<usize> = sorted.iter().map(|v| v.playlist_index).collect();
            assert_eq!(indices, vec![5, 4, 3, 2, 1]);
            assert_eq!(sorted[0].download_index, Some(1));
            assert_eq!(sorted[4].download_index, Some(5));

            let mut urls: Vec<&str> = sorted.iter().map(|v| v.url.as_str()).collect();
            urls.sort();
            let original = videos(5, "v");
            let mut expected: Vec<&str> = original.iter().map(|v| v.url.as_str()).collect();
            expected.sort();
            assert_eq!(urls, expected);
        }
    }

    #[test]
    fn folder_names_are_sanitized() {
        assert_eq!(playlist_folder_name("Live: Sets / 2024"), "Live Sets 2024");
        assert_eq!(playlist_folder_name("///"), UNKNOWN_PLAYLIST);
    }

    #[tokio::test]
    async fn counts_add_up_and_document_is_written() -> Result<()> {
        let url = "https://www.youtube.com/playlist?list=PLa";
        let fetcher = FakeFetcher {
            failing: HashSet::from(["a 2".to_string()]),
            present: HashSet::from(["a 4".to_string()]),
            ..FakeFetcher::default()
        };
        let (dir, downloader) =
            downloader(FakeSource::default().with(url, "Jazz: Standards", videos(5, "a")), fetcher)?;
        let options = DownloadOptions {
            sort_order: SortOrder::Reverse,
            ..quick_options()
        };

        let outcome = downloader.download_playlist(url, &options).await?;
        let PlaylistOutcome::Completed { info, result } = outcome else {
            panic!("expected a completed playlist");
        };
        assert_eq!(info.title, "Jazz: Standards");
        assert_eq!((result.success_count, result.skipped_count, result.fail_count), (3, 1, 1));
        assert_eq!(result.processed(), result.total_videos);
        assert!(result.is_complete());

        let folder = dir.path().join("downloads").join("Jazz Standards");
        assert_eq!(result.playlist_folder, folder);
        assert_eq!(
            *downloader.fetcher.fetched.lock(),
            vec!["a 5", "a 4", "a 3", "a 2", "a 1"]
        );

        let document: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(folder.join(PLAYLIST_DOCUMENT_FILE))?)?;
        assert_eq!(document["totalVideos"], 5);
        assert_eq!(document["sortOrder"], "reverse");
        assert_eq!(document["videos"][0]["playlistIndex"], 1);
        assert!(document["videos"][0].get("downloadIndex").is_none());
        assert_eq!(document["sortedVideos"][0]["playlistIndex"], 5);
        assert_eq!(document["sortedVideos"][0]["downloadIndex"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn stop_on_error_returns_partial_counts() -> Result<()> {
        let url = "https://www.youtube.com/playlist?list=PLb";
        let fetcher = FakeFetcher {
            failing: HashSet::from(["b 2".to_string()]),
            ..FakeFetcher::default()
        };
        let (dir, downloader) =
            downloader(FakeSource::default().with(url, "Stops", videos(4, "b")), fetcher)?;
        fs::create_dir_all(dir.path().join(".temp"))?;
        fs::write(dir.path().join(".temp").join("player-script.js"), b"debug")?;
        let options = DownloadOptions {
            continue_on_error: false,
            ..quick_options()
        };

        let err = downloader.download_playlist(url, &options).await.unwrap_err();
        match err {
            PlaylistError::Aborted { title, partial, .. } => {
                assert_eq!(title, "b 2");
                assert_eq!((partial.success_count, partial.fail_count), (1, 1));
                assert!(!partial.is_complete());
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(*downloader.fetcher.fetched.lock(), vec!["b 1", "b 2"]);
        assert!(!dir.path().join(".temp").join("player-script.js").exists());
        Ok(())
    }

    #[tokio::test]
    async fn empty_playlist_creates_nothing() -> Result<()> {
        let url = "https://www.youtube.com/playlist?list=PLempty";
        let (dir, downloader) = downloader(
            FakeSource::default().with(url, "Nothing Here", Vec::new()),
            FakeFetcher::default(),
        )?;

        let outcome = downloader.download_playlist(url, &quick_options()).await?;
        assert!(matches!(outcome, PlaylistOutcome::Empty { .. }));
        assert!(!dir.path().join("downloads").exists());
        assert!(downloader.fetcher.fetched.lock().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn flat_mode_skips_folder_and_document() -> Result<()> {
        let url = "https://www.youtube.com/playlist?list=PLflat";
        let (dir, downloader) = downloader(
            FakeSource::default().with(url, "Flat", videos(2, "f")),
            FakeFetcher::default(),
        )?;
        let options = DownloadOptions {
            create_playlist_folder: false,
            ..quick_options()
        };

        downloader.download_playlist(url, &options).await?;
        let root = dir.path().join("downloads");
        assert!(root.join("f 1.mp4").exists());
        assert!(!root.join("Flat").exists());
        assert!(!root.join(PLAYLIST_DOCUMENT_FILE).exists());
        Ok(())
    }

    #[tokio::test]
    async fn failed_playlist_is_isolated() -> Result<()> {
        let urls = vec![
            "https://www.youtube.com/playlist?list=PL1".to_string(),
            "https://www.youtube.com/playlist?list=PLbroken".to_string(),
            "https://www.youtube.com/playlist?list=PL3".to_string(),
        ];
        let source = FakeSource::default()
            .with(&urls[0], "First", videos(2, "x"))
            .with(&urls[2], "Third", videos(3, "y"));
        let fetcher = FakeFetcher {
            failing: HashSet::from(["y 3".to_string()]),
            ..FakeFetcher::default()
        };
        let (_dir, downloader) = downloader(source, fetcher)?;

        let summary = downloader
            .download_multiple_playlists(&urls, &quick_options())
            .await;
        assert_eq!(summary.total_playlists, 3);
        assert_eq!(summary.successful_playlists, 2);
        assert_eq!(summary.failed_playlists, 1);
        assert_eq!(summary.total_videos_downloaded, 4);
        assert_eq!(summary.total_videos_failed, 1);
        assert_eq!(summary.results.len(), 3);
        assert!(!summary.results[1].is_success());
        match &summary.results[1].status {
            PlaylistStatus::Failed { error } => assert!(error.contains("net::ERR_NAME_NOT_RESOLVED")),
            PlaylistStatus::Succeeded(_) => panic!("second playlist should fail"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn stop_on_playlist_error_keeps_prior_results() -> Result<()> {
        let urls = vec![
            "https://www.youtube.com/playlist?list=PL1".to_string(),
            "https://www.youtube.com/playlist?list=PLbroken".to_string(),
            "https://www.youtube.com/playlist?list=PL3".to_string(),
        ];
        let source = FakeSource::default()
            .with(&urls[0], "First", videos(1, "x"))
            .with(&urls[2], "Third", videos(1, "y"));
        let (_dir, downloader) = downloader(source, FakeFetcher::default())?;
        let options = DownloadOptions {
            continue_on_playlist_error: false,
            ..quick_options()
        };

        let summary = downloader.download_multiple_playlists(&urls, &options).await;
        assert_eq!(summary.results.len(), 2);
        assert_eq!(summary.successful_playlists, 1);
        assert_eq!(summary.failed_playlists, 1);
        assert_eq!(*downloader.source.visited.lock(), urls[..2].to_vec());
        Ok(())
    }

    fn paced_options() -> DownloadOptions {
        DownloadOptions {
            delay_between_downloads_ms: 3000,
            delay_between_playlists_ms: 5000,
            ..DownloadOptions::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_between_videos_but_not_after_the_last() -> Result<()> {
        let url = "https://www.youtube.com/playlist?list=PLpaced";
        let (_dir, downloader) = downloader(
            FakeSource::default().with(url, "Paced", videos(3, "p")),
            FakeFetcher::default(),
        )?;

        let started = tokio::time::Instant::now();
        downloader.download_playlist(url, &paced_options()).await?;
        assert_eq!(started.elapsed(), Duration::from_millis(2 * 3000));
        assert_eq!(downloader.fetcher.fetched.lock().len(), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn single_video_playlist_does_not_wait() -> Result<()> {
        let url = "https://www.youtube.com/playlist?list=PLone";
        let (_dir, downloader) = downloader(
            FakeSource::default().with(url, "One", videos(1, "o")),
            FakeFetcher::default(),
        )?;

        let started = tokio::time::Instant::now();
        downloader.download_playlist(url, &paced_options()).await?;
        assert_eq!(started.elapsed(), Duration::ZERO);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_between_playlists_but_not_after_the_last() -> Result<()> {
        let urls: Vec<String> = (1..=3)
            .map(|n| format!("https://www.youtube.com/playlist?list=PL{n}"))
            .collect();
        let source = urls.iter().enumerate().fold(FakeSource::default(), |source, (n, url)| {
            source.with(url, &format!("Set {n}"), videos(1, &format!("s{n}")))
        });
        let (_dir, downloader) = downloader(source, FakeFetcher::default())?;

        let started = tokio::time::Instant::now();
        let summary = downloader.download_multiple_playlists(&urls, &paced_options()).await;
        assert_eq!(summary.successful_playlists, 3);
        assert_eq!(started.elapsed(), Duration::from_millis(2 * 5000));

        let started = tokio::time::Instant::now();
        downloader
            .download_multiple_playlists(&urls[..1], &paced_options())
            .await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        Ok(())
    }

    #[test]
    fn extract_options_follow_download_options() {
        let options = DownloadOptions {
            headless: false,
            timeout_ms: 1500,
            max_videos: Some(7),
            ..DownloadOptions::default()
        };
        let extract = ExtractOptions::from(&options);
        assert!(!extract.headless);
        assert_eq!(extract.timeout, Duration::from_millis(1500));
        assert_eq!(extract.max_videos, Some(7));
    }
}
