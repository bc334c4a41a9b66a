//! Error types for Subtle
//!
//! Every failure the session layer can report, classified by how the
//! caller is expected to react. Fingerprinting problems are not errors:
//! they are carried as sentinel values on [`crate::models::Fingerprint`].

use thiserror::Error;

/// Errors raised by the session, search and download layers
#[derive(Error, Debug)]
pub enum SubtleError {
    /// The remote host could not be reached at all (fatal)
    #[error("Could not connect to OpenSubtitles: {0}")]
    Unreachable(String),

    /// The server refused the credentials or sent no token (fatal)
    #[error("Login unsuccessful: {0}")]
    LoginFailed(String),

    /// The transport gave up waiting for a response
    #[error("Request to OpenSubtitles timed out")]
    Timeout,

    /// A response whose status did not start with 200
    #[error("OpenSubtitles responded with status: {0}")]
    ProtocolStatus(String),

    /// Any other transport failure (connection reset, HTTP error page)
    #[error("Request failed: {0}")]
    Transport(String),

    /// A 200 response missing the fields we need
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Subtitle payload could not be decoded to UTF-8 text
    #[error("Could not decode subtitle: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation needs an authenticated session
    #[error("Not logged in")]
    NotLoggedIn,

    /// The caller passed arguments that break an API contract
    #[error("Invalid argument: {0}")]
    ContractViolation(String),
}

/// How an error should be handled by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Nothing useful can happen afterwards; exit
    Fatal,
    /// Operation aborted, caller may try again
    Transient,
    /// Session state adjusted, execution continues
    Soft,
    /// Local data or filesystem problem
    Local,
    /// Caller bug
    Contract,
}

impl SubtleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubtleError::Unreachable(_) | SubtleError::LoginFailed(_) => ErrorKind::Fatal,
            SubtleError::Timeout | SubtleError::ProtocolStatus(_) | SubtleError::Transport(_) => {
                ErrorKind::Transient
            }
            SubtleError::NotLoggedIn => ErrorKind::Soft,
            SubtleError::Malformed(_) | SubtleError::Decode(_) | SubtleError::Io(_) => {
                ErrorKind::Local
            }
            SubtleError::ContractViolation(_) => ErrorKind::Contract,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

impl From<reqwest::Error> for SubtleError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            SubtleError::Timeout
        } else {
            SubtleError::Transport(error.to_string())
        }
    }
}

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, SubtleError>;
