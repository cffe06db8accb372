#![forbid(unsafe_code)]

//! Playlist title and channel resolution.
//!
//! Each field has an ordered chain of resolvers. A resolver is a pure function
//! over a [`PageSnapshot`]; the first one yielding a plausible value wins and
//! the sentinel is used when none does. Resolution never fails.

use std::collections::HashMap;

use log::debug;
use serde::Deserialize;
use url::Url;

use crate::metadata::{PlaylistInfo, UNKNOWN_CHANNEL, UNKNOWN_PLAYLIST};

/// Headline elements of the playlist header, most specific first.
pub const TITLE_STRUCTURAL_SELECTORS: &[&str] = &[
    "h1.style-scope.ytd-playlist-header-renderer",
    "h1.ytd-playlist-header-renderer",
    "yt-formatted-string.style-scope.ytd-playlist-header-renderer",
    "h1 yt-formatted-string",
    "ytd-playlist-header-renderer #title",
    "yt-formatted-string.title",
];

pub const TITLE_GENERIC_SELECTORS: &[&str] = &["h1", ".title", "yt-formatted-string#title"];

pub const CHANNEL_SELECTORS: &[&str] = &[
    "ytd-video-owner-renderer a.yt-simple-endpoint yt-formatted-string",
    "ytd-channel-name a yt-formatted-string",
    ".ytd-channel-name a",
    "ytd-playlist-header-renderer .owner-text a",
    ".owner-text a",
];

/// Meta tags captured in the snapshot, keyed by `property`, `name` or
/// `itemprop:<name>`.
pub const META_KEYS: &[&str] = &["og:title", "title", "author", "itemprop:author"];

const DOCUMENT_TITLE_SUFFIX: &str = " - YouTube";

/// Words that mark site chrome rather than a playlist name.
const NOISE_WORDS: &[&str] = &[
    "subscribe",
    "views",
    "ago",
    "youtube",
    "sign in",
    "play all",
    "shuffle",
    "videos",
];

/// Text read from the page after scrolling finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSnapshot {
    /// Trimmed text of the first element matching each selector.
    pub selector_texts: HashMap<String, String>,
    pub meta: HashMap<String, String>,
    pub document_title: String,
    pub url: String,
    /// Short visible texts in document order, for the last-resort heuristic.
    pub short_texts: Vec<String>,
}

impl PageSnapshot {
    fn selector_text(&self, selector: &str) -> Option<&str> {
        self.selector_texts
            .get(selector)
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
    }
}

/// Length bounds (exclusive, in characters) plus words that disqualify a value.
#[derive(Debug, Clone, Copy)]
pub struct Plausibility {
    pub min_len: usize,
    pub max_len: usize,
    pub banned: &'static [&'static str],
}

pub const TITLE_RULE: Plausibility = Plausibility {
    min_len: 3,
    max_len: 200,
    banned: &["youtube", "subscribe"],
};

pub const CHANNEL_RULE: Plausibility = Plausibility {
    min_len: 0,
    max_len: 100,
    banned: &["subscribe"],
};

const HEURISTIC_RULE: Plausibility = Plausibility {
    min_len: 3,
    max_len: 100,
    banned: NOISE_WORDS,
};

impl Plausibility {
    pub fn accepts(&self, text: &str) -> bool {
        let len = text.chars().count();
        if len <= self.min_len || len >= self.max_len {
            return false;
        }
        let lower = text.to_lowercase();
        !self.banned.iter().any(|word| lower.contains(word))
    }

    fn first<'a>(&self, candidates: impl IntoIterator<Item = &'a str>) -> Option<String> {
        candidates
            .into_iter()
            .map(str::trim)
            .find(|text| self.accepts(text))
            .map(str::to_string)
    }
}

pub type FieldResolver = fn(&PageSnapshot) -> Option<String>;

pub const TITLE_RESOLVERS: &[(&str, FieldResolver)] = &[
    ("header selector", structural_title),
    ("generic headline", generic_title),
    ("meta tag", meta_title),
    ("document title", document_title),
    ("playlist id", playlist_id_title),
    ("short text heuristic", heuristic_title),
];

pub const CHANNEL_RESOLVERS: &[(&str, FieldResolver)] = &[
    ("channel link", channel_link),
    ("meta author", meta_author),
];

fn structural_title(snapshot: &PageSnapshot) -> Option<String> {
    TITLE_RULE.first(
        TITLE_STRUCTURAL_SELECTORS
            .iter()
            .filter_map(|selector| snapshot.selector_text(selector)),
    )
}

fn generic_title(snapshot: &PageSnapshot) -> Option<String> {
    TITLE_RULE.first(
        TITLE_GENERIC_SELECTORS
            .iter()
            .filter_map(|selector| snapshot.selector_text(selector)),
    )
}

fn meta_title(snapshot: &PageSnapshot) -> Option<String> {
    TITLE_RULE.first(
        ["og:title", "title"]
            .iter()
            .filter_map(|key| snapshot.meta.get(*key).map(String::as_str)),
    )
}

fn document_title(snapshot: &PageSnapshot) -> Option<String> {
    let title = snapshot.document_title.trim();
    let title = title.strip_suffix(DOCUMENT_TITLE_SUFFIX).unwrap_or(title);
    TITLE_RULE.first([title])
}

fn playlist_id_title(snapshot: &PageSnapshot) -> Option<String> {
    let url = Url::parse(&snapshot.url).ok()?;
    url.query_pairs()
        .find(|(key, value)| key == "list" && !value.is_empty())
        .map(|(_, value)| format!("Playlist_{value}"))
}

fn heuristic_title(snapshot: &PageSnapshot) -> Option<String> {
    HEURISTIC_RULE.first(snapshot.short_texts.iter().map(String::as_str))
}

fn channel_link(snapshot: &PageSnapshot) -> Option<String> {
    CHANNEL_RULE.first(
        CHANNEL_SELECTORS
            .iter()
            .filter_map(|selector| snapshot.selector_text(selector)),
    )
}

fn meta_author(snapshot: &PageSnapshot) -> Option<String> {
    CHANNEL_RULE.first(
        ["itemprop:author", "author"]
            .iter()
            .filter_map(|key| snapshot.meta.get(*key).map(String::as_str)),
    )
}

/// Runs a chain and reports which resolver produced the value.
pub fn resolve(
    chain: &[(&'static str, FieldResolver)],
    snapshot: &PageSnapshot,
) -> Option<(&'static str, String)> {
    chain
        .iter()
        .find_map(|(name, resolver)| resolver(snapshot).map(|value| (*name, value)))
}

/// Every selector the snapshot must capture for the chains above.
pub fn snapshot_selectors() -> Vec<&'static str> {
    TITLE_STRUCTURAL_SELECTORS
        .iter()
        .chain(TITLE_GENERIC_SELECTORS)
        .chain(CHANNEL_SELECTORS)
        .copied()
        .collect()
}

pub fn resolve_playlist_info(snapshot: &PageSnapshot) -> PlaylistInfo {
    let title = match resolve(TITLE_RESOLVERS, snapshot) {
        Some((source, title)) => {
            debug!("playlist title from {source}: {title}");
            title
        }
        None => UNKNOWN_PLAYLIST.to_string(),
    };
    let channel = match resolve(CHANNEL_RESOLVERS, snapshot) {
        Some((source, channel)) => {
            debug!("channel from {source}: {channel}");
            channel
        }
        None => UNKNOWN_CHANNEL.to_string(),
    };
    PlaylistInfo { title, channel }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with(selectors: &[(&str, &str)]) -> PageSnapshot {
        PageSnapshot {
            selector_texts: selectors
                .iter()
                .map(|(selector, text)| (selector.to_string(), text.to_string()))
                .collect(),
            ..PageSnapshot::default()
        }
    }

    #[test]
    fn structural_selectors_win_over_generic_ones() {
        let snapshot = snapshot_with(&[
            ("h1", "Generic Heading"),
            ("h1.ytd-playlist-header-renderer", "  Rust Course  "),
            ("ytd-channel-name a yt-formatted-string", "Ferris"),
        ]);
        let info = resolve_playlist_info(&snapshot);
        assert_eq!(info.title, "Rust Course");
        assert_eq!(info.channel, "Ferris");
    }

    #[test]
    fn implausible_headlines_fall_through() {
        let mut snapshot = snapshot_with(&[
            ("h1.ytd-playlist-header-renderer", "YouTube"),
            ("h1", "abc"),
            (".title", "Subscribe to the channel"),
        ]);
        snapshot
            .meta
            .insert("og:title".into(), "Deep Dive Sessions".into());
        assert_eq!(
            resolve(TITLE_RESOLVERS, &snapshot),
            Some(("meta tag", "Deep Dive Sessions".to_string()))
        );
    }

    #[test]
    fn document_title_drops_site_suffix() {
        let snapshot = PageSnapshot {
            document_title: "Synth Tutorials - YouTube".into(),
            ..PageSnapshot::default()
        };
        assert_eq!(resolve_playlist_info(&snapshot).title, "Synth Tutorials");
    }

    #[test]
    fn playlist_id_precedes_heuristic() {
        let snapshot = PageSnapshot {
            url: "https://www.youtube.com/playlist?list=PL123&si=x".into(),
            short_texts: vec!["Some Heading".into()],
            ..PageSnapshot::default()
        };
        assert_eq!(resolve_playlist_info(&snapshot).title, "Playlist_PL123");
    }

    #[test]
    fn heuristic_skips_noise_words() {
        let snapshot = PageSnapshot {
            short_texts: vec![
                "Subscribe".into(),
                "1,024 views".into(),
                "3 days ago".into(),
                "ok".into(),
                "Lo-fi Beats Archive".into(),
            ],
            ..PageSnapshot::default()
        };
        assert_eq!(
            resolve(TITLE_RESOLVERS, &snapshot),
            Some(("short text heuristic", "Lo-fi Beats Archive".to_string()))
        );
    }

    #[test]
    fn unresolved_fields_use_sentinels() {
        let info = resolve_playlist_info(&PageSnapshot::default());
        assert_eq!(info.title, UNKNOWN_PLAYLIST);
        assert_eq!(info.channel, UNKNOWN_CHANNEL);
    }

    #[test]
    fn channel_falls_back_to_meta_author() {
        let mut snapshot = snapshot_with(&[(".owner-text a", "   ")]);
        snapshot.meta.insert("author".into(), "Studio Ghibli Fan".into());
        assert_eq!(resolve_playlist_info(&snapshot).channel, "Studio Ghibli Fan");
    }

    #[test]
    fn plausibility_bounds_are_exclusive() {
        assert!(!TITLE_RULE.accepts("abc"));
        assert!(TITLE_RULE.accepts("abcd"));
        assert!(!TITLE_RULE.accepts(&"x".repeat(200)));
        assert!(TITLE_RULE.accepts(&"x".repeat(199)));
        assert!(!CHANNEL_RULE.accepts(""));
    }

    #[test]
    fn snapshot_selectors_cover_every_chain() {
        let selectors = snapshot_selectors();
        assert!(selectors.contains(&"h1"));
        assert!(selectors.contains(&".owner-text a"));
        assert_eq!(
            selectors.len(),
            TITLE_STRUCTURAL_SELECTORS.len() + TITLE_GENERIC_SELECTORS.len() + CHANNEL_SELECTORS.len()
        );
    }
}
