//! OpenSubtitles session: login lifecycle, search and download

mod download;
mod manager;
mod search;

pub use download::{decode_payload, gunzip_utf8, subtitle_path};
pub use manager::{
    md5_hex, Credentials, LoginTimeoutPolicy, SessionConfig, SessionManager, SessionStatus,
    DEFAULT_KEEP_ALIVE, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SERVER_URL, DEFAULT_USER_AGENT,
};
pub use search::{build_queries, SearchQuery, SearchStrategy, MAX_SEARCH_LIMIT};
