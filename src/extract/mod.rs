#![forbid(unsafe_code)]

//! Playlist extraction: scroll a rendered playlist page until its list stops
//! growing, then read one [`VideoRecord`] per item plus the playlist title and
//! channel.
//!
//! The browser is hidden behind [`PlaylistPage`]; [`webdriver`] provides the
//! real implementation and tests drive the protocol with in-memory pages.

pub mod convergence;
pub mod records;
pub mod resolvers;
pub mod webdriver;

use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use tokio::time::sleep;

use crate::error::ExtractError;
use crate::metadata::{PlaylistInfo, VideoRecord};

pub use convergence::{Convergence, ScrollPolicy, ScrollState, Step, StopReason};
pub use records::RawItem;
pub use resolvers::PageSnapshot;
pub use webdriver::{BrowserExtractor, BrowserSettings};

/// Operations the extractor needs from a loaded playlist page.
#[async_trait]
pub trait PlaylistPage: Send {
    /// Waits until at least one list item rendered.
    async fn wait_for_items(&mut self, timeout: Duration) -> Result<(), ExtractError>;
    async fn scroll_to_bottom(&mut self) -> Result<(), ExtractError>;
    /// Scroll technique used on probe rounds.
    async fn scroll_alternate(&mut self) -> Result<(), ExtractError>;
    /// Clicks a "show more" control if one is visible.
    async fn click_show_more(&mut self) -> Result<bool, ExtractError>;
    async fn item_count(&mut self) -> Result<usize, ExtractError>;
    async fn items(&mut self) -> Result<Vec<RawItem>, ExtractError>;
    async fn snapshot(&mut self) -> Result<PageSnapshot, ExtractError>;
    /// Ends the browser session. Called exactly once, on success and failure.
    async fn close(&mut self) -> Result<(), ExtractError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub headless: bool,
    pub timeout: Duration,
    pub max_videos: Option<usize>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            headless: true,
            timeout: Duration::from_secs(30),
            max_videos: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub playlist_info: PlaylistInfo,
    pub videos: Vec<VideoRecord>,
}

/// Anything that can turn a playlist URL into an [`Extraction`].
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn extract(&self, url: &str, options: &ExtractOptions)
    -> Result<Extraction, ExtractError>;
}

/// Runs the full protocol on `page` and closes it afterwards, whatever the
/// outcome.
pub async fn extract_from_page<P: PlaylistPage>(
    page: &mut P,
    options: &ExtractOptions,
    policy: &ScrollPolicy,
) -> Result<Extraction, ExtractError> {
    let outcome = run_extraction(page, options, policy).await;
    if let Err(err) = page.close().await {
        warn!("could not close browser session: {err}");
    }
    outcome
}

async fn run_extraction<P: PlaylistPage>(
    page: &mut P,
    options: &ExtractOptions,
    policy: &ScrollPolicy,
) -> Result<Extraction, ExtractError> {
    info!("waiting for playlist content to load");
    page.wait_for_items(options.timeout).await?;

    info!("scrolling to load all videos");
    let convergence = scroll_until_converged(page, options.max_videos, policy).await?;
    info!(
        "found {} videos after {} scroll rounds",
        convergence.count(),
        convergence.rounds()
    );

    let items = page.items().await?;
    let mut videos = records::collect_records(items);
    if let Some(limit) = options.max_videos {
        videos.truncate(limit);
    }

    let snapshot = match page.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!("could not read playlist header, using fallbacks: {err}");
            PageSnapshot::default()
        }
    };
    let playlist_info = resolvers::resolve_playlist_info(&snapshot);

    info!("playlist: {}", playlist_info.title);
    info!("channel: {}", playlist_info.channel);
    info!("videos found: {}", videos.len());

    Ok(Extraction {
        playlist_info,
        videos,
    })
}

/// Scroll/settle/count rounds driven by [`Convergence`]. On hitting the round
/// cap one extra burst of aggressive scrolling is attempted.
pub async fn scroll_until_converged<P: PlaylistPage>(
    page: &mut P,
    limit: Option<usize>,
    policy: &ScrollPolicy,
) -> Result<Convergence, ExtractError> {
    let mut convergence = Convergence::new(policy.clone(), limit);

    let reason = loop {
        let previous = convergence.count();
        page.scroll_to_bottom().await?;
        sleep(policy.settle).await;
        let count = page.item_count().await?;

        let step = convergence.observe(count);
        match convergence.state() {
            ScrollState::Growing => info!("loaded {count} videos (+{} new)", count.saturating_sub(previous)),
            ScrollState::Stable { unchanged } => info!(
                "no new videos (attempt {unchanged}/{}), current count: {count}",
                policy.stable_rounds
            ),
            ScrollState::Exhausted(_) => {}
        }

        match step {
            Step::Stop(reason) => break reason,
            Step::Continue { probe: true } => {
                page.scroll_alternate().await?;
                if page.click_show_more().await? {
                    info!("clicked a \"show more\" control");
                }
                sleep(policy.probe_settle).await;
            }
            Step::Continue { probe: false } => {}
        }
    };

    match reason {
        StopReason::LimitReached => info!("reached maximum video limit ({})", convergence.count()),
        StopReason::Converged => {}
        StopReason::RoundCap => {
            warn!(
                "scroll cap of {} rounds reached, trying {} more aggressive scrolls",
                policy.max_rounds, policy.final_burst
            );
            for _ in 0..policy.final_burst {
                page.scroll_to_bottom().await?;
                page.scroll_alternate().await?;
                sleep(policy.settle).await;
                convergence.observe_burst(page.item_count().await?);
                if convergence.limit_reached() {
                    break;
                }
            }
        }
    }

    Ok(convergence)
}


#[cfg(test)]
mod tests {
    use super::fake::{ScriptedPage, watch_items};
    use super::*;
    use crate::metadata::UNKNOWN_PLAYLIST;
    use std::collections::HashMap;

    fn options(max_videos: Option<usize>) -> ExtractOptions {
        ExtractOptions {
            max_videos,
            ..ExtractOptions::default()
        }
    }

    #[tokio::test]
    async fn stops_on_stability_after_thirteen_rounds() {
        let mut page = ScriptedPage::new(vec![7, 14, 20], watch_items(20));
        let extraction = extract_from_page(&mut page, &options(None), &ScrollPolicy::immediate())
            .await
            .unwrap();

        assert_eq!(page.scrolls, 13);
        assert_eq!(page.alternate_scrolls, 2);
        assert_eq!(extraction.videos.len(), 20);
        assert_eq!(extraction.videos[19].playlist_index, 20);
        assert_eq!(extraction.videos[0].url, "https://www.youtube.com/watch?v=vid1");
        assert_eq!(extraction.videos[0].upload_info.as_deref(), Some("1 days ago"));
        assert_eq!(page.closed, 1);
    }

    #[tokio::test]
    async fn max_videos_stops_early_and_caps_records() {
        let counts: Vec<usize> = (1..=200).collect();
        let mut page = ScriptedPage::new(counts, watch_items(8));
        let extraction = extract_from_page(&mut page, &options(Some(5)), &ScrollPolicy::immediate())
            .await
            .unwrap();

        assert_eq!(page.scrolls, 5);
        assert!(page.scrolls <= ScrollPolicy::default().max_rounds);
        assert_eq!(extraction.videos.len(), 5);
    }

    #[tokio::test]
    async fn round_cap_triggers_one_final_burst() {
        let counts: Vec<usize> = (1..=500).collect();
        let mut page = ScriptedPage::new(counts, watch_items(3));
        let policy = ScrollPolicy::immediate();
        let convergence = scroll_until_converged(&mut page, None, &policy).await.unwrap();

        assert_eq!(convergence.state(), ScrollState::Exhausted(StopReason::RoundCap));
        assert_eq!(page.scrolls, policy.max_rounds + policy.final_burst);
        assert_eq!(convergence.count(), (policy.max_rounds + policy.final_burst) as usize);
    }

    #[tokio::test]
    async fn wait_timeout_fails_and_still_closes() {
        let mut page = ScriptedPage::new(vec![0], Vec::new());
        page.fail_wait = true;
        let err = extract_from_page(&mut page, &options(None), &ScrollPolicy::immediate())
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::Timeout { timeout_ms: 30_000 }));
        assert_eq!(page.scrolls, 0);
        assert_eq!(page.closed, 1);
    }

    #[tokio::test]
    async fn header_failure_degrades_to_sentinel() {
        let mut page = ScriptedPage::new(vec![2], watch_items(2));
        let extraction = extract_from_page(&mut page, &options(None), &ScrollPolicy::immediate())
            .await
            .unwrap();
        assert_eq!(extraction.playlist_info.title, UNKNOWN_PLAYLIST);
        assert_eq!(extraction.videos.len(), 2);
    }

    #[tokio::test]
    async fn header_snapshot_feeds_resolvers() {
        let mut page = ScriptedPage::new(vec![1], watch_items(1));
        page.snapshot = Some(PageSnapshot {
            selector_texts: HashMap::from([
                ("h1".to_string(), "Bread Baking".to_string()),
                (".owner-text a".to_string(), "Crumb Lab".to_string()),
            ]),
            ..PageSnapshot::default()
        });
        let extraction = extract_from_page(&mut page, &options(None), &ScrollPolicy::immediate())
            .await
            .unwrap();
        assert_eq!(extraction.playlist_info.title, "Bread Baking");
        assert_eq!(extraction.playlist_info.channel, "Crumb Lab");
    }
}
