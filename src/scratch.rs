#![forbid(unsafe_code)]

//! Scratch directory for transient files produced while resolving media
//! metadata (player scripts, cached pages and the like).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the directory if needed and returns its path.
    pub fn ensure(&self) -> io::Result<&Path> {
        fs::create_dir_all(&self.path)?;
        Ok(&self.path)
    }

    /// Deletes the files directly inside the scratch directory. Failures are
    /// logged and otherwise ignored. Returns how many files were removed.
    pub fn cleanup(&self) -> usize {
        if !self.path.exists() {
            return 0;
        }

        let mut removed = 0;
        for entry in WalkDir::new(&self.path).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("could not scan {}: {}", self.path.display(), err);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("cleaned up {}", entry.file_name().to_string_lossy());
                    removed += 1;
                }
                Err(err) => warn!("could not remove {}: {}", entry.path().display(), err),
            }
        }
        removed
    }
}
