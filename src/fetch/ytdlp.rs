#![forbid(unsafe_code)]

//! Primary strategy: hand the whole download to a `yt-dlp` subprocess.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, info};
use tokio::process::Command;

use super::{FetchJob, FetchStrategy};
use crate::config::USER_AGENT;
use crate::error::FetchError;
use crate::metadata::DownloadResult;

/// Keeps files at or below 720p so playlists stay a manageable size.
pub const FORMAT_SELECTOR: &str = "best[height<=720]";

/// Longest diagnostic tail kept from the subprocess output.
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

pub struct YtDlpStrategy {
    program: PathBuf,
    user_agent: String,
}

impl YtDlpStrategy {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            user_agent: USER_AGENT.to_string(),
        }
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// Output template: the known title, or yt-dlp's own title field.
pub fn output_template(folder: &Path, title: Option<&str>) -> String {
    let stem = title.unwrap_or("%(title)s");
    folder.join(format!("{stem}.%(ext)s")).display().to_string()
}

pub fn download_args(job: &FetchJob, user_agent: &str) -> Vec<String> {
    vec![
        "-f".to_string(),
        FORMAT_SELECTOR.to_string(),
        "-o".to_string(),
        output_template(&job.folder, job.title.as_deref()),
        "--no-playlist".to_string(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        "--no-simulate".to_string(),
        "--user-agent".to_string(),
        user_agent.to_string(),
        job.url.clone(),
    ]
}

/// File stem of the last path yt-dlp printed, i.e. the title it settled on.
fn printed_title(stdout: &[u8]) -> Option<String> {
    let stdout = String::from_utf8_lossy(stdout);
    let path = stdout.lines().map(str::trim).rfind(|line| !line.is_empty())?;
    Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

/// Joins stdout and stderr and keeps the tail, where yt-dlp prints its errors.
fn diagnostic_output(stdout: &[u8], stderr: &[u8]) -> String {
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(stdout),
        String::from_utf8_lossy(stderr)
    );
    let trimmed = combined.trim();
    let count = trimmed.chars().count();
    if count <= MAX_DIAGNOSTIC_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - MAX_DIAGNOSTIC_CHARS).collect()
}

#[async_trait]
impl FetchStrategy for YtDlpStrategy {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch(&self, job: &FetchJob) -> Result<DownloadResult, FetchError> {
        tokio::fs::create_dir_all(&job.folder)
            .await
            .map_err(|source| FetchError::Io {
                path: job.folder.clone(),
                source,
            })?;

        info!("downloading {} with yt-dlp", job.label());
        let args = download_args(job, &self.user_agent);
        debug!("{} {}", self.program_name(), args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| FetchError::Spawn {
                program: self.program_name(),
                source,
            })?;

        if !output.status.success() {
            return Err(FetchError::Subprocess {
                program: self.program_name(),
                status: output.status,
                output: diagnostic_output(&output.stdout, &output.stderr),
            });
        }

        // Untitled jobs report the file name yt-dlp chose, or the URL if it
        // printed nothing.
        let title = job
            .title
            .clone()
            .or_else(|| printed_title(&output.stdout))
            .unwrap_or_else(|| job.label().to_string());
        info!("downloaded {title}");
        Ok(DownloadResult::downloaded(title))
    }
}
