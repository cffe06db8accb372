#![forbid(unsafe_code)]

//! Runtime settings and download options.
//!
//! Settings (where things live) resolve as CLI override > environment >
//! `.env` file > default. Download options come from defaults, then an
//! optional TOML batch file, then CLI flags.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::metadata::SortOrder;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DOWNLOAD_ROOT: &str = "downloads";
pub const DEFAULT_SCRATCH_DIR: &str = ".temp";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";

/// Desktop Chrome user agent sent by the browser and the external downloader.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub download_root: PathBuf,
    pub scratch_dir: PathBuf,
    pub webdriver_url: String,
    pub yt_dlp: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub download_root: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub webdriver_url: Option<String>,
    pub yt_dlp: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_settings(overrides: RuntimeOverrides) -> Result<RuntimeSettings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_runtime_settings(&file_vars, env_var_string, overrides))
}

fn build_runtime_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeSettings {
    let download_root = overrides
        .download_root
        .or_else(|| lookup_value("DOWNLOAD_ROOT", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_ROOT));
    let scratch_dir = overrides
        .scratch_dir
        .or_else(|| lookup_value("SCRATCH_DIR", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR));
    let webdriver_url = overrides
        .webdriver_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| lookup_value("WEBDRIVER_URL", file_vars, &env_lookup))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string());
    let yt_dlp = overrides
        .yt_dlp
        .or_else(|| lookup_value("YT_DLP_BIN", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_YT_DLP));

    RuntimeSettings {
        download_root,
        scratch_dir,
        webdriver_url,
        yt_dlp,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| {
        file_vars
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .cloned()
    })
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

/// Every knob of a playlist or batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
    /// Attempts for metadata resolution in the streaming fallback.
    pub max_retries: u32,
    pub delay_between_downloads_ms: u64,
    pub delay_between_playlists_ms: u64,
    pub continue_on_error: bool,
    pub continue_on_playlist_error: bool,
    pub headless: bool,
    /// Bound for page-level browser operations.
    pub timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_videos: Option<usize>,
    pub create_playlist_folder: bool,
    pub sort_order: SortOrder,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_between_downloads_ms: 3000,
            delay_between_playlists_ms: 5000,
            continue_on_error: true,
            continue_on_playlist_error: true,
            headless: true,
            timeout_ms: 30_000,
            max_videos: None,
            create_playlist_folder: true,
            sort_order: SortOrder::Playlist,
        }
    }
}

impl DownloadOptions {
    pub fn delay_between_downloads(&self) -> Duration {
        Duration::from_millis(self.delay_between_downloads_ms)
    }

    pub fn delay_between_playlists(&self) -> Duration {
        Duration::from_millis(self.delay_between_playlists_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Contents of a `--config` batch file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchFile {
    pub playlists: Vec<String>,
    pub options: DownloadOptions,
}

pub fn load_batch_file(path: &Path) -> Result<BatchFile> {
    let raw = fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("Parsing {}", path.display()))
}

/// Renders a starter batch file with every option at its default.
pub fn example_batch_file() -> Result<String> {
    let example = BatchFile {
        playlists: vec![
            "https://www.youtube.com/playlist?list=YOUR_PLAYLIST_ID_1".to_string(),
            "https://www.youtube.com/playlist?list=YOUR_PLAYLIST_ID_2".to_string(),
        ],
        options: DownloadOptions::default(),
    };
    let body = toml::to_string_pretty(&example).context("Rendering example batch file")?;
    Ok(format!(
        "# Playlist batch file. Run: download_playlists --config <this file>\n\
         # sort_order is one of \"playlist\", \"upload\" (oldest first) or \"reverse\".\n\
         # Add max_videos = N under [options] to cap each playlist.\n\n{body}"
    ))
}

pub fn write_example_batch_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("Creating {}", parent.display()))?;
    }
    fs::write(path, example_batch_file()?).with_context(|| format!("Writing {}", path.display()))
}
