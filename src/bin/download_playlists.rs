#![forbid(unsafe_code)]

//! Command-line entry point that downloads one or more YouTube playlists.
//!
//! Playlist URLs come from positional arguments and/or a TOML batch file. Each
//! playlist is rendered in Chrome through a WebDriver endpoint, then its videos
//! are fetched one by one with yt-dlp (falling back to direct streaming).

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::LevelFilter;
use playlist_tools::config::{
    DownloadOptions, RuntimeOverrides, RuntimeSettings, load_batch_file, resolve_runtime_settings,
    write_example_batch_file,
};
use playlist_tools::extract::{BrowserExtractor, BrowserSettings};
use playlist_tools::fetch::VideoFetcher;
use playlist_tools::logging::init_logger;
use playlist_tools::metadata::{BatchSummary, PlaylistOutcome, PlaylistStatus, SortOrder};
use playlist_tools::orchestrator::PlaylistDownloader;
use playlist_tools::scratch::ScratchDir;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Exit status used when the batch is cancelled with Ctrl-C.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser, Debug)]
#[command(author, version, about = "Download YouTube playlists into per-playlist folders.")]
struct Cli {
    #[arg(value_name = "URL", help = "Playlist URLs, processed in order")]
    urls: Vec<String>,
    #[arg(
        long = "config",
        value_name = "PATH",
        help = "TOML batch file with `playlists` and an [options] table"
    )]
    config: Option<PathBuf>,
    #[arg(
        long = "write-example-config",
        value_name = "PATH",
        help = "Write a commented example batch file and exit"
    )]
    write_example_config: Option<PathBuf>,
    #[arg(long = "env-file", value_name = "PATH", help = "Read settings from this file instead of .env")]
    env_file: Option<PathBuf>,
    #[arg(long = "download-root", value_name = "PATH", help = "Base download directory")]
    download_root: Option<PathBuf>,
    #[arg(long = "scratch-dir", value_name = "PATH", help = "Directory for transient files")]
    scratch_dir: Option<PathBuf>,
    #[arg(long = "webdriver-url", value_name = "URL", help = "WebDriver endpoint driving Chrome")]
    webdriver_url: Option<String>,
    #[arg(long = "yt-dlp", value_name = "PATH", help = "yt-dlp executable")]
    yt_dlp: Option<PathBuf>,
    #[arg(long = "headed", help = "Show the browser window")]
    headed: bool,
    #[arg(long = "timeout-ms", value_name = "MS", help = "Page operation timeout")]
    timeout_ms: Option<u64>,
    #[arg(long = "max-videos", value_name = "N", help = "Only take the first N videos of each playlist")]
    max_videos: Option<usize>,
    #[arg(long = "max-retries", value_name = "N", help = "Metadata attempts in the streaming fallback")]
    max_retries: Option<u32>,
    #[arg(long = "delay-between-downloads-ms", value_name = "MS")]
    delay_between_downloads_ms: Option<u64>,
    #[arg(long = "delay-between-playlists-ms", value_name = "MS")]
    delay_between_playlists_ms: Option<u64>,
    #[arg(long = "stop-on-error", help = "Abort a playlist at its first failed video")]
    stop_on_error: bool,
    #[arg(long = "stop-on-playlist-error", help = "Abort the batch at its first failed playlist")]
    stop_on_playlist_error: bool,
    #[arg(long = "flat", help = "Download straight into the download root")]
    flat: bool,
    #[arg(long = "sort-order", value_enum, value_name = "ORDER")]
    sort_order: Option<SortOrder>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: LevelFilter,
}

impl Cli {
    fn runtime_overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            download_root: self.download_root.clone(),
            scratch_dir: self.scratch_dir.clone(),
            webdriver_url: self.webdriver_url.clone(),
            yt_dlp: self.yt_dlp.clone(),
            env_path: self.env_file.clone(),
        }
    }

    /// Playlist URLs (batch file first, then positional) and the options
    /// after applying command-line flags on top of the batch file.
    fn batch(&self) -> Result<(Vec<String>, DownloadOptions)> {
        let (mut urls, mut options) = match &self.config {
            Some(path) => {
                let file = load_batch_file(path)?;
                (file.playlists, file.options)
            }
            None => (Vec::new(), DownloadOptions::default()),
        };
        urls.extend(self.urls.iter().cloned());
        urls.retain(|url| !url.trim().is_empty());
        self.apply_flags(&mut options);
        Ok((urls, options))
    }

    fn apply_flags(&self, options: &mut DownloadOptions) {
        if self.headed {
            options.headless = false;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            options.timeout_ms = timeout_ms;
        }
        if self.max_videos.is_some() {
            options.max_videos = self.max_videos;
        }
        if let Some(max_retries) = self.max_retries {
            options.max_retries = max_retries;
        }
        if let Some(delay) = self.delay_between_downloads_ms {
            options.delay_between_downloads_ms = delay;
        }
        if let Some(delay) = self.delay_between_playlists_ms {
            options.delay_between_playlists_ms = delay;
        }
        if self.stop_on_error {
            options.continue_on_error = false;
        }
        if self.stop_on_playlist_error {
            options.continue_on_playlist_error = false;
        }
        if self.flat {
            options.create_playlist_folder = false;
        }
        if let Some(sort_order) = self.sort_order {
            options.sort_order = sort_order;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.log_level).context("initializing logger")?;

    if let Some(path) = &cli.write_example_config {
        write_example_batch_file(path)?;
        println!("Example batch file written to {}", path.display());
        return Ok(());
    }

    let (urls, options) = cli.batch()?;
    if urls.is_empty() {
        bail!("no playlist URLs given; pass them as arguments or through --config");
    }
    let settings = resolve_runtime_settings(cli.runtime_overrides())?;
    ensure_program_available(&settings.yt_dlp)?;

    print_banner(&urls, &options, &settings);

    let extractor = BrowserExtractor::new(BrowserSettings {
        webdriver_url: settings.webdriver_url.clone(),
        ..BrowserSettings::default()
    });
    let fetcher = VideoFetcher::standard(&settings, &options);
    let scratch = ScratchDir::new(&settings.scratch_dir);
    let downloader = PlaylistDownloader::new(
        extractor,
        fetcher,
        &settings.download_root,
        scratch.clone(),
    );

    let summary = tokio::select! {
        summary = downloader.download_multiple_playlists(&urls, &options) => summary,
        _ = tokio::signal::ctrl_c() => {
            eprintln!();
            eprintln!("Download interrupted by user");
            scratch.cleanup();
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    };

    print_summary(&summary);
    Ok(())
}

/// Runs `<program> --version` to fail loudly when yt-dlp is missing.
fn ensure_program_available(program: &Path) -> Result<()> {
    let status = Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => bail!(
            "{} is installed but returned a failure status",
            program.display()
        ),
        Err(err) => bail!(
            "{} is not installed or not in PATH: {}",
            program.display(),
            err
        ),
    }
}

fn print_banner(urls: &[String], options: &DownloadOptions, settings: &RuntimeSettings) {
    println!("===================================");
    println!("YouTube Playlist Downloader");
    println!("===================================");
    println!("Playlists: {}", urls.len());
    println!("Download root: {}", settings.download_root.display());
    println!("Sort order: {}", options.sort_order.as_str());
    if let Some(max_videos) = options.max_videos {
        println!("Max videos per playlist: {max_videos}");
    }
    println!(
        "Browser: {} via {}",
        if options.headless { "headless" } else { "visible" },
        settings.webdriver_url
    );
    println!();
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!("===================================");
    println!("Batch complete!");
    println!("===================================");
    println!(
        "Playlists: {} total, {} successful, {} failed",
        summary.total_playlists, summary.successful_playlists, summary.failed_playlists
    );
    println!(
        "Videos: {} downloaded, {} skipped, {} failed",
        summary.total_videos_downloaded, summary.total_videos_skipped, summary.total_videos_failed
    );
    println!();

    for report in &summary.results {
        match &report.status {
            PlaylistStatus::Succeeded(PlaylistOutcome::Completed { info, result }) => {
                println!("[ok] {} ({})", info.title, report.url);
                println!(
                    "     {} downloaded, {} skipped, {} failed -> {}",
                    result.success_count,
                    result.skipped_count,
                    result.fail_count,
                    result.playlist_folder.display()
                );
            }
            PlaylistStatus::Succeeded(PlaylistOutcome::Empty { info }) => {
                println!("[ok] {} ({}) had no videos", info.title, report.url);
            }
            PlaylistStatus::Failed { error } => {
                println!("[failed] {}", report.url);
                println!("     {error}");
            }
        }
    }
}
