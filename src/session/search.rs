//! Multi-strategy subtitle search
//!
//! Query shapes are tried in a fixed order and the first one that returns
//! anything wins. Results are never merged across strategies.

use std::fmt;

use log::{debug, info};

use super::SessionManager;
use crate::api::{ensure_ok, Value};
use crate::error::{Result, SubtleError};
use crate::models::{SortField, SortOrder, SubtitleCandidate, SubtitleMatches, VideoIdentity};
use uuid::Uuid;

/// Largest `limit` the server accepts
pub const MAX_SEARCH_LIMIT: u32 = 500;

/// The query shapes, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Fingerprint plus byte size
    Fingerprint,
    /// IMDb id from a previous CheckMovieHash
    ImdbId,
    /// Exact file name as a tag
    Tag,
    /// File name without extension as free text
    FileName,
    /// Containing folder name as free text
    Folder,
}

impl SearchStrategy {
    pub fn tag(&self) -> &'static str {
        match self {
            SearchStrategy::Fingerprint => "moviehash",
            SearchStrategy::ImdbId => "imdbid",
            SearchStrategy::Tag => "tag",
            SearchStrategy::FileName => "filename",
            SearchStrategy::Folder => "folder",
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One query shape. `params` is `None` when the video lacks the data for it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub strategy: SearchStrategy,
    pub params: Option<Value>,
}

/// Build all five query shapes for `video`, in priority order
pub fn build_queries(video: &VideoIdentity, languages: &[String]) -> Vec<SearchQuery> {
    let sublanguageid = Value::from(languages.join(","));
    let with_languages = |mut members: Vec<(&str, Value)>| {
        members.push(("sublanguageid", sublanguageid.clone()));
        Value::structure(members)
    };

    vec![
        SearchQuery {
            strategy: SearchStrategy::Fingerprint,
            params: video.fingerprint().hex().map(|hash| {
                with_languages(vec![
                    ("moviehash", Value::from(hash)),
                    ("moviebytesize", Value::from(video.size().to_string())),
                ])
            }),
        },
        SearchQuery {
            strategy: SearchStrategy::ImdbId,
            params: video
                .movie()
                .map(|movie| with_languages(vec![("imdbid", Value::from(movie.imdb_id.as_str()))])),
        },
        SearchQuery {
            strategy: SearchStrategy::Tag,
            params: Some(with_languages(vec![("tag", Value::from(video.file_name()))])),
        },
        SearchQuery {
            strategy: SearchStrategy::FileName,
            params: Some(with_languages(vec![("query", Value::from(video.stem()))])),
        },
        SearchQuery {
            strategy: SearchStrategy::Folder,
            params: video
                .folder_name()
                .map(|folder| with_languages(vec![("query", Value::from(folder))])),
        },
    ]
}

impl SessionManager {
    /// Find subtitles for `video`, grouped by preferred language
    ///
    /// Returns an empty result when not logged in or when no strategy
    /// matched. Each language group is sorted by download count, highest
    /// first.
    pub async fn search(&self, video: &VideoIdentity, limit: u32) -> Result<SubtitleMatches> {
        if limit > MAX_SEARCH_LIMIT {
            return Err(SubtleError::ContractViolation(format!(
                "search limit {} exceeds the maximum of {}",
                limit, MAX_SEARCH_LIMIT
            )));
        }

        if !self.is_logged_in() {
            debug!("Search skipped: not logged in");
            return Ok(SubtitleMatches::new());
        }

        let token = self.token()?;
        let languages = self.languages();
        info!("Looking for subtitles for '{}'...", video.file_name());

        for query in build_queries(video, &languages) {
            let Some(params) = query.params else {
                debug!("Skipping {} search, not enough information", query.strategy);
                continue;
            };

            let response = self
                .inner
                .rpc
                .call(
                    "SearchSubtitles",
                    &[
                        Value::from(token.as_str()),
                        Value::Array(vec![params]),
                        Value::structure([("limit", Value::Int(i64::from(limit)))]),
                    ],
                )
                .await?;
            let body = ensure_ok(&response)?;

            // "data" is `false` rather than an empty array when nothing matched
            let records = body
                .get("data")
                .and_then(Value::as_array)
                .unwrap_or_default();

            if records.is_empty() {
                debug!("Nothing matched by {}", query.strategy);
                continue;
            }

            info!("{} subtitles matched by {} search", records.len(), query.strategy);
            return group_candidates(video.id(), &languages, records, query.strategy);
        }

        info!(
            "Sorry - could not find any matching subtitles for '{}'",
            video.file_name()
        );
        Ok(SubtitleMatches::new())
    }
}

/// Keep preferred languages only, in preference order, most downloaded first
fn group_candidates(
    video_id: Uuid,
    languages: &[String],
    records: &[Value],
    strategy: SearchStrategy,
) -> Result<SubtitleMatches> {
    let mut matches = SubtitleMatches::new();

    for lang in languages {
        for record in records {
            if record.get("SubLanguageID").and_then(Value::as_str) == Some(lang.as_str()) {
                matches.push(candidate_from_record(video_id, record, strategy)?);
            }
        }
    }

    matches.sort_all(SortField::DownloadCount, SortOrder::Descending);
    Ok(matches)
}

fn candidate_from_record(
    video_id: Uuid,
    record: &Value,
    strategy: SearchStrategy,
) -> Result<SubtitleCandidate> {
    let text = |key: &str| {
        record
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let download_id = record
        .get("IDSubtitleFile")
        .and_then(Value::coerce_i64)
        .and_then(|id| u64::try_from(id).ok())
        .ok_or_else(|| {
            SubtleError::Malformed("subtitle record without a valid IDSubtitleFile".to_string())
        })?;

    Ok(SubtitleCandidate {
        video_id,
        file_name: text("SubFileName"),
        download_id,
        language_id: text("SubLanguageID"),
        iso639: text("ISO639"),
        language_name: text("LanguageName"),
        rating: record
            .get("SubRating")
            .and_then(Value::coerce_f64)
            .unwrap_or(0.0),
        hd: record
            .get("SubHD")
            .and_then(Value::coerce_bool)
            .unwrap_or(false),
        hearing_impaired: record
            .get("SubHearingImpaired")
            .and_then(Value::coerce_bool)
            .unwrap_or(false),
        download_count: record
            .get("SubDownloadsCnt")
            .and_then(Value::coerce_i64)
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(0),
        fps: record
            .get("MovieFPS")
            .and_then(Value::coerce_f64)
            .unwrap_or(0.0),
        matched_by: record
            .get("MatchedBy")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| strategy.tag().to_string()),
    })
}
