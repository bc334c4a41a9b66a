//! Directory browsing for picking a video
//!
//! Lists sub-directories and video files of one directory at a time. Hidden
//! entries are skipped and both lists are sorted by name.

use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;

use crate::error::{Result, SubtleError};

/// Extensions recognised as video files (compared case-insensitively)
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "avi", "mp4"];

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Contents of one directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub directory: PathBuf,
    pub parent: Option<PathBuf>,
    pub directories: Vec<String>,
    pub videos: Vec<String>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.videos.is_empty()
    }
}

/// A directory whose video files can be listed
#[derive(Debug, Clone)]
pub struct Navigator {
    current: PathBuf,
}

impl Navigator {
    /// Start at `dir`, which must be an existing directory
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let current = std::fs::canonicalize(dir.as_ref())?;
        if !current.is_dir() {
            return Err(SubtleError::ContractViolation(format!(
                "{} is not a directory",
                current.display()
            )));
        }
        Ok(Self { current })
    }

    pub fn list(&self) -> Result<Listing> {
        let mut listing = Listing {
            directory: self.current.clone(),
            parent: self.current.parent().map(Path::to_path_buf),
            ..Default::default()
        };

        for entry in std::fs::read_dir(&self.current)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            // Follow symlinks so linked folders and videos show up
            let path = entry.path();
            if path.is_dir() {
                listing.directories.push(name);
            } else if path.is_file() && is_video_file(&path) {
                listing.videos.push(name);
            }
        }

        listing.directories.sort();
        listing.videos.sort();
        debug!(
            "{}: {} directories, {} videos",
            self.current.display(),
            listing.directories.len(),
            listing.videos.len()
        );
        Ok(listing)
    }
}
