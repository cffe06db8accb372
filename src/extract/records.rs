#![forbid(unsafe_code)]

//! Turns rendered playlist items into [`VideoRecord`]s.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::metadata::VideoRecord;

static RELATIVE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+\s+(year|month|week|day|hour)s?\s+ago").expect("valid relative date regex")
});

/// One list item as read from the page, in render order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawItem {
    pub href: Option<String>,
    #[serde(default)]
    pub title: String,
    /// Texts of the small metadata spans under the title.
    #[serde(default)]
    pub metadata: Vec<String>,
}

/// Reduces a watch link to `origin + /watch?v=<id>`, dropping playlist,
/// index and tracking parameters. Returns `None` for anything that is not a
/// watch link.
pub fn normalize_watch_url(href: &str) -> Option<String> {
    if !href.contains("/watch") {
        return None;
    }
    let parsed = Url::parse(href).ok()?;
    if parsed.path() != "/watch" {
        return None;
    }
    let video_id = parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())?;

    let mut clean = parsed.clone();
    clean.set_fragment(None);
    clean.set_query(None);
    clean.query_pairs_mut().append_pair("v", &video_id);
    Some(clean.to_string())
}

/// First metadata text that looks like "3 weeks ago".
pub fn find_upload_info(texts: &[String]) -> Option<String> {
    texts
        .iter()
        .map(|text| text.trim())
        .find(|text| RELATIVE_DATE.is_match(text))
        .map(str::to_string)
}

/// Builds records from raw items. Items without a watch link are skipped but
/// still occupy their render position.
pub fn collect_records(items: Vec<RawItem>) -> Vec<VideoRecord> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let Some(url) = item.href.as_deref().and_then(normalize_watch_url) else {
                debug!("skipping item {} without a watch link", position + 1);
                return None;
            };
            Some(VideoRecord {
                playlist_index: position + 1,
                url,
                title: item.title.trim().to_string(),
                upload_info: find_upload_info(&item.metadata),
                download_index: None,
            })
        })
        .collect()
}
