//! CLI - Command Line Interface for Subtle
//!
//! Every operation is scriptable and all output is JSON-parseable.
//!
//! # Examples
//!
//! ```bash
//! # Fingerprint a file (no network)
//! subtle hash ~/Movies/heat.1995.mkv
//!
//! # Find and fetch subtitles
//! subtle search ~/Movies/heat.1995.mkv --sort rating
//! subtle download ~/Movies/heat.1995.mkv --lang dut
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::models::{SortField, SortOrder};

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// OpenSubtitles could not be reached
    Unreachable = 2,
    /// Invalid arguments
    InvalidArgs = 3,
    /// Credentials rejected
    LoginFailed = 4,
    /// No subtitles found
    NoSubtitles = 5,
    /// Download or decoding failed
    DownloadFailed = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// Subtle - a small OpenSubtitles assistant
///
/// Run without arguments to browse the current directory for videos.
#[derive(Parser, Debug)]
#[command(
    name = "subtle",
    version,
    about = "Find and download subtitles from OpenSubtitles",
    long_about = "Fingerprints a video file, looks it up on OpenSubtitles and \
                  saves the best matching subtitle next to it.\n\n\
                  Credentials are read from the config file or from the \
                  SUBTLE_USERNAME and SUBTLE_PASSWORD environment variables.",
    after_help = "EXAMPLES:\n\
                  subtle                                  Browse the current directory\n\
                  subtle hash movie.mkv                   Print the file fingerprint\n\
                  subtle search movie.mkv --sort rating   List matching subtitles\n\
                  subtle download movie.mkv --lang eng    Save the best English subtitle"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run (omit to browse the current directory)
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the OpenSubtitles fingerprint of a file
    #[command(visible_alias = "h")]
    Hash(HashCmd),

    /// List sub-directories and video files
    #[command(visible_alias = "ls")]
    Browse(BrowseCmd),

    /// Show OpenSubtitles server information
    #[command(visible_alias = "i")]
    Info(InfoCmd),

    /// Search subtitles for a video
    #[command(visible_alias = "s")]
    Search(SearchCmd),

    /// Download a subtitle next to a video
    #[command(visible_alias = "dl")]
    Download(DownloadCmd),
}

/// Fingerprint a video file
#[derive(Args, Debug)]
pub struct HashCmd {
    /// Video file
    #[arg(required = true)]
    pub file: PathBuf,
}

/// Browse a directory for video files
#[derive(Args, Debug, Default)]
pub struct BrowseCmd {
    /// Directory to list (default: current directory)
    pub dir: Option<PathBuf>,
}

/// Show server handshake information
#[derive(Args, Debug)]
pub struct InfoCmd {}

// =============================================================================
// Search Command
// =============================================================================

/// Search subtitles for a video file
#[derive(Args, Debug)]
pub struct SearchCmd {
    /// Video file
    #[arg(required = true)]
    pub file: PathBuf,

    /// Maximum number of results per query (at most 500)
    #[arg(long, short = 'l')]
    pub limit: Option<u32>,

    /// Sort each language group by
    #[arg(long, value_enum, default_value = "downloads")]
    pub sort: SortKey,

    /// Sort ascending instead of descending
    #[arg(long)]
    pub asc: bool,
}

impl SearchCmd {
    pub fn order(&self) -> SortOrder {
        if self.asc {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        }
    }
}

/// Sort criterion for subtitle candidates
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Subtitle file name
    Name,
    /// Download id
    Id,
    /// User rating
    Rating,
    /// Download count (default)
    #[default]
    Downloads,
    /// Frame rate
    Fps,
}

impl From<SortKey> for SortField {
    fn from(key: SortKey) -> SortField {
        match key {
            SortKey::Name => SortField::FileName,
            SortKey::Id => SortField::DownloadId,
            SortKey::Rating => SortField::Rating,
            SortKey::Downloads => SortField::DownloadCount,
            SortKey::Fps => SortField::Fps,
        }
    }
}

// =============================================================================
// Download Command
// =============================================================================

/// Download a subtitle for a video file
#[derive(Args, Debug)]
pub struct DownloadCmd {
    /// Video file
    #[arg(required = true)]
    pub file: PathBuf,

    /// Subtitle id from `search` output
    #[arg(long, short = 'i', conflicts_with = "lang")]
    pub id: Option<u64>,

    /// Language id (e.g. "eng"); takes the most downloaded subtitle
    #[arg(long, short = 'l')]
    pub lang: Option<String>,

    /// Maximum number of results per query (at most 500)
    #[arg(long)]
    pub limit: Option<u32>,
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

/// Fingerprint response
#[derive(Debug, Serialize, Deserialize)]
pub struct HashResponse {
    pub file: String,
    pub size: u64,
    pub hash: String,
}

/// Download success response
#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub status: &'static str,
    pub subtitle_id: u64,
    pub language: String,
    pub path: String,
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data as JSON
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        let output = JsonOutput::success(data);
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    /// Print a line of human-readable results
    pub fn line(&self, msg: impl std::fmt::Display) {
        println!("{}", msg);
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
