//! Subtle - a small OpenSubtitles assistant
//!
//! Fingerprints local video files, finds matching subtitles through the
//! OpenSubtitles XML-RPC API and saves them next to the video.
//!
//! # Modules
//!
//! - `hash` - Content fingerprint (size + head/tail checksum)
//! - `models` - Video identity, subtitle candidates, server info
//! - `api` - XML-RPC codec and HTTP client
//! - `session` - Login lifecycle, keep-alive, search and download
//! - `timer` - Restartable periodic task used for keep-alive
//! - `navigator` - Directory browsing for video files
//! - `config`, `cli`, `commands` - Command line front end

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod hash;
pub mod models;
pub mod navigator;
pub mod session;
pub mod timer;

// Re-export commonly used types
pub use error::{ErrorKind, Result, SubtleError};
pub use models::{
    Fingerprint, MovieMatch, ServerInfo, SortField, SortOrder, SubtitleCandidate,
    SubtitleMatches, VideoIdentity,
};
pub use navigator::{Listing, Navigator};
pub use session::{Credentials, SessionConfig, SessionManager, SessionStatus};
pub use timer::PeriodicTimer;
