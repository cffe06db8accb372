#![forbid(unsafe_code)]

//! Metadata and byte streams for the streaming fallback.
//!
//! [`YtDlpProvider`] asks `yt-dlp` for the resolved format list as JSON and
//! streams the chosen format over HTTP with `reqwest`.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tokio::process::Command;

use crate::config::USER_AGENT;

#[derive(Debug, Clone, PartialEq)]
pub struct MediaFormat {
    pub format_id: String,
    pub url: String,
    /// Human label such as "720p"; compared numerically among formats that
    /// carry neither height nor bitrate.
    pub quality_label: Option<String>,
    pub container: Option<String>,
    /// False only when the provider reports the track as `"none"`.
    pub has_video: bool,
    pub has_audio: bool,
    pub content_length: Option<u64>,
    pub height: Option<u32>,
    /// Total bitrate in kbit/s.
    pub tbr: Option<f64>,
    pub http_headers: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub title: String,
    pub duration: Option<f64>,
    pub formats: Vec<MediaFormat>,
}

pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Resolves video metadata and opens media streams.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Any incidental files produced while resolving land in `workdir`.
    async fn resolve(&self, url: &str, workdir: &Path) -> Result<MediaInfo>;
    async fn open_stream(&self, format: &MediaFormat) -> Result<ByteStream>;
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<RawFormat>,
    /// Single-format results carry the URL at the top level.
    #[serde(flatten)]
    top_level: RawFormat,
}

#[derive(Debug, Default, Deserialize)]
struct RawFormat {
    #[serde(default)]
    format_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    format_note: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    filesize_approx: Option<u64>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    tbr: Option<f64>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

/// A missing codec field means unknown. Only `"none"` rules the track out.
fn codec_present(codec: Option<&str>) -> bool {
    codec != Some("none")
}

impl RawFormat {
    fn into_format(self) -> Option<MediaFormat> {
        let url = self.url.filter(|url| !url.is_empty())?;
        let quality_label = self
            .format_note
            .filter(|note| !note.is_empty())
            .or_else(|| self.height.map(|height| format!("{height}p")));
        Some(MediaFormat {
            format_id: self.format_id.unwrap_or_default(),
            url,
            quality_label,
            container: self.ext,
            has_video: codec_present(self.vcodec.as_deref()),
            has_audio: codec_present(self.acodec.as_deref()),
            content_length: self.filesize.or(self.filesize_approx),
            height: self.height,
            tbr: self.tbr,
            http_headers: self.http_headers,
        })
    }
}

/// Parses `yt-dlp --dump-single-json` output.
pub fn parse_media_info(raw: &str) -> Result<MediaInfo> {
    let info: RawInfo = serde_json::from_str(raw).context("deserializing yt-dlp metadata")?;
    let mut formats: Vec<MediaFormat> = info
        .formats
        .into_iter()
        .filter_map(RawFormat::into_format)
        .collect();
    if formats.is_empty()
        && let Some(single) = info.top_level.into_format()
    {
        formats.push(single);
    }
    Ok(MediaInfo {
        title: info.title.unwrap_or_default(),
        duration: info.duration,
        formats,
    })
}

pub struct YtDlpProvider {
    program: PathBuf,
    client: reqwest::Client,
}

impl YtDlpProvider {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            client: reqwest::Client::new(),
        }
    }

    fn headers(format: &MediaFormat) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in &format.http_headers {
            if let Ok(name) = HeaderName::from_bytes(name.as_bytes())
                && let Ok(value) = HeaderValue::from_str(value)
            {
                headers.insert(name, value);
            }
        }
        if !headers.contains_key(reqwest::header::USER_AGENT) {
            headers.insert(
                reqwest::header::USER_AGENT,
                HeaderValue::from_static(USER_AGENT),
            );
        }
        headers
    }
}

#[async_trait]
impl MediaProvider for YtDlpProvider {
    async fn resolve(&self, url: &str, workdir: &Path) -> Result<MediaInfo> {
        tokio::fs::create_dir_all(workdir)
            .await
            .with_context(|| format!("creating {}", workdir.display()))?;

        let output = Command::new(&self.program)
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg(url)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("fetching metadata for {url}"))?;

        if !output.status.success() {
            bail!(
                "metadata command failed for {} (status {}): {}",
                url,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let raw = String::from_utf8(output.stdout).context("parsing metadata JSON as UTF-8")?;
        parse_media_info(&raw)
    }

    async fn open_stream(&self, format: &MediaFormat) -> Result<ByteStream> {
        let response = self
            .client
            .get(&format.url)
            .headers(Self::headers(format))
            .send()
            .await
            .with_context(|| format!("requesting format {}", format.format_id))?
            .error_for_status()
            .with_context(|| format!("requesting format {}", format.format_id))?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other))
            .boxed())
    }
}
