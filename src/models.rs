//! Data structures and types for Subtle
//!
//! Contains the shared models used across the application:
//! - **Video**: file identity and content fingerprint
//! - **Subtitles**: search candidates grouped by language
//! - **Server**: handshake information

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Result, SubtleError};
use crate::hash;

// =============================================================================
// Video Models
// =============================================================================

/// Outcome of fingerprinting a file
///
/// Failures are values, not errors, so callers can branch on them directly.
/// They render as non-hex tags so they can never be mistaken for a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    Hash(u64),
    /// File is smaller than the two 64 KiB windows
    TooSmall,
    /// File could not be read or seeked
    IoError,
}

impl Fingerprint {
    /// 16-digit lowercase hex form, only for a real hash
    pub fn hex(&self) -> Option<String> {
        match self {
            Fingerprint::Hash(h) => Some(format!("{:016x}", h)),
            _ => None,
        }
    }

    pub fn is_hash(&self) -> bool {
        matches!(self, Fingerprint::Hash(_))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Hash(h) => write!(f, "{:016x}", h),
            Fingerprint::TooSmall => write!(f, "SizeError"),
            Fingerprint::IoError => write!(f, "IOError"),
        }
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Movie metadata matched by the server from a fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieMatch {
    /// IMDb id without the "tt" prefix, as OpenSubtitles sends it
    pub imdb_id: String,
    pub title: String,
    pub year: Option<u16>,
}

impl fmt::Display for MovieMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year {
            Some(year) => write!(f, "{} ({}) [tt{}]", self.title, year, self.imdb_id),
            None => write!(f, "{} [tt{}]", self.title, self.imdb_id),
        }
    }
}

/// A local video file opened for subtitle lookup
///
/// The fingerprint is computed once in [`VideoIdentity::open`] and has no
/// setter. Only the movie match can be filled in later.
#[derive(Debug, Clone, Serialize)]
pub struct VideoIdentity {
    id: Uuid,
    path: PathBuf,
    file_name: String,
    directory: PathBuf,
    size: u64,
    fingerprint: Fingerprint,
    movie: Option<MovieMatch>,
}

impl VideoIdentity {
    /// Open a video file and fingerprint it
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = std::fs::canonicalize(path.as_ref())?;
        let metadata = std::fs::metadata(&path)?;
        if !metadata.is_file() {
            return Err(SubtleError::ContractViolation(format!(
                "{} is not a file",
                path.display()
            )));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let size = metadata.len();
        let fingerprint = hash::fingerprint_path(&path);

        Ok(Self {
            id: Uuid::new_v4(),
            path,
            file_name,
            directory,
            size,
            fingerprint,
            movie: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Name of the folder containing the video
    pub fn folder_name(&self) -> Option<String> {
        self.directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }

    /// File name with the extension removed
    pub fn stem(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name.clone())
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn movie(&self) -> Option<&MovieMatch> {
        self.movie.as_ref()
    }

    pub(crate) fn set_movie(&mut self, movie: MovieMatch) {
        self.movie = Some(movie);
    }
}

impl fmt::Display for VideoIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.file_name, self.fingerprint)?;
        if let Some(ref movie) = self.movie {
            write!(f, " - {}", movie)?;
        }
        Ok(())
    }
}

// =============================================================================
// Subtitle Models
// =============================================================================

/// One subtitle search result, not yet downloaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCandidate {
    /// Id of the [`VideoIdentity`] this result was found for
    pub video_id: Uuid,
    pub file_name: String,
    /// `IDSubtitleFile`, used by DownloadSubtitles
    pub download_id: u64,
    /// Three-letter language id (`SubLanguageID`), the grouping key
    pub language_id: String,
    /// Two-letter ISO 639 code, used in the output file name
    pub iso639: String,
    pub language_name: String,
    pub rating: f64,
    pub hd: bool,
    pub hearing_impaired: bool,
    pub download_count: u64,
    pub fps: f64,
    /// How the server matched it (moviehash, imdbid, tag, fulltext)
    pub matched_by: String,
}

impl fmt::Display for SubtitleCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.hd {
            flags.push("HD");
        }
        if self.hearing_impaired {
            flags.push("HI");
        }

        let flag_str = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(" "))
        };

        write!(
            f,
            "{} [[ ID: {} - Download Count: {} ]]{}",
            self.file_name, self.download_id, self.download_count, flag_str
        )
    }
}

/// Field to sort a language group by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    FileName,
    DownloadId,
    Rating,
    DownloadCount,
    Fps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

fn compare_by(a: &SubtitleCandidate, b: &SubtitleCandidate, field: SortField) -> Ordering {
    match field {
        SortField::FileName => a.file_name.cmp(&b.file_name),
        SortField::DownloadId => a.download_id.cmp(&b.download_id),
        SortField::Rating => a.rating.total_cmp(&b.rating),
        SortField::DownloadCount => a.download_count.cmp(&b.download_count),
        SortField::Fps => a.fps.total_cmp(&b.fps),
    }
}

/// Search results grouped by language, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleMatches {
    groups: Vec<(String, Vec<SubtitleCandidate>)>,
}

impl SubtitleMatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate to its language group, creating the group if needed
    pub fn push(&mut self, candidate: SubtitleCandidate) {
        match self
            .groups
            .iter_mut()
            .find(|(lang, _)| *lang == candidate.language_id)
        {
            Some((_, list)) => list.push(candidate),
            None => self
                .groups
                .push((candidate.language_id.clone(), vec![candidate])),
        }
    }

    pub fn get(&self, language: &str) -> Option<&[SubtitleCandidate]> {
        self.groups
            .iter()
            .find(|(lang, _)| lang == language)
            .map(|(_, list)| list.as_slice())
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(lang, _)| lang.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SubtitleCandidate])> {
        self.groups
            .iter()
            .map(|(lang, list)| (lang.as_str(), list.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of candidates across all languages
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, list)| list.len()).sum()
    }

    /// Sort one language group. Returns false if the language is absent.
    pub fn sort_language(&mut self, language: &str, field: SortField, order: SortOrder) -> bool {
        match self.groups.iter_mut().find(|(lang, _)| lang == language) {
            Some((_, list)) => {
                sort_list(list, field, order);
                true
            }
            None => false,
        }
    }

    pub fn sort_all(&mut self, field: SortField, order: SortOrder) {
        for (_, list) in &mut self.groups {
            sort_list(list, field, order);
        }
    }

    pub fn find(&self, download_id: u64) -> Option<&SubtitleCandidate> {
        self.groups
            .iter()
            .flat_map(|(_, list)| list.iter())
            .find(|c| c.download_id == download_id)
    }

    /// Head of a language group, or of the first group when no language is given
    pub fn best(&self, language: Option<&str>) -> Option<&SubtitleCandidate> {
        match language {
            Some(lang) => self.get(lang).and_then(|list| list.first()),
            None => self.groups.first().and_then(|(_, list)| list.first()),
        }
    }
}

fn sort_list(list: &mut [SubtitleCandidate], field: SortField, order: SortOrder) {
    list.sort_by(|a, b| {
        let ordering = compare_by(a, b, field);
        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
}

impl Serialize for SubtitleMatches {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (lang, list) in &self.groups {
            map.serialize_entry(lang, list)?;
        }
        map.end()
    }
}

// =============================================================================
// Server Models
// =============================================================================

/// Subset of the ServerInfo handshake response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub application: Option<String>,
    pub xmlrpc_version: Option<String>,
    pub users_online: Option<i64>,
    pub subtitle_files: Option<i64>,
    pub movies_total: Option<i64>,
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (XML-RPC {})",
            self.application.as_deref().unwrap_or("OpenSubtitles"),
            self.xmlrpc_version.as_deref().unwrap_or("?")
        )?;
        if let Some(users) = self.users_online {
            write!(f, " - {} users online", users)?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
