//! OpenSubtitles session lifecycle
//!
//! Owns the XML-RPC client, the auth token, the preferred languages and the
//! keep-alive timer. States: Disconnected, LoggedOut (connected) and
//! LoggedIn.
//!
//! Lock order is session state first, then timer state. The keep-alive
//! action only holds a weak reference back to the session.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::FutureExt;
use log::{debug, error, info, warn};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::api::{ensure_ok, Value, XmlRpcClient};
use crate::error::{Result, SubtleError};
use crate::models::{MovieMatch, ServerInfo, VideoIdentity};
use crate::timer::{PeriodicTimer, TimerAction};

pub const DEFAULT_SERVER_URL: &str = "https://api.opensubtitles.org:443/xml-rpc";

/// Registered user agent for this client
pub const DEFAULT_USER_AGENT: &str = "Subtle1";

pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(900);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Configuration
// =============================================================================

/// What a timed-out LogIn means for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginTimeoutPolicy {
    /// Reported as [`SubtleError::Unreachable`]; the front end exits
    #[default]
    Fatal,
    /// Reported as [`SubtleError::Timeout`]; the caller may retry
    Recoverable,
}

/// Session settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub server_url: String,
    pub user_agent: String,
    pub keep_alive: Duration,
    pub request_timeout: Duration,
    /// Log out when a whole keep-alive interval passes without activity
    pub idle_logout: bool,
    pub login_timeout_policy: LoginTimeoutPolicy,
    /// Used when the account has no preferred languages set
    pub fallback_languages: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            idle_logout: true,
            login_timeout_policy: LoginTimeoutPolicy::Fatal,
            fallback_languages: vec!["eng".to_string()],
        }
    }
}

/// Username plus the MD5 hex digest LogIn expects
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password_md5: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: &str) -> Self {
        Self {
            username: username.into(),
            password_md5: md5_hex(password),
        }
    }

    /// Use an already hashed password
    pub fn from_md5(username: impl Into<String>, password_md5: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_md5: password_md5.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password_md5(&self) -> &str {
        &self.password_md5
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password_md5", &"<redacted>")
            .finish()
    }
}

pub fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

// =============================================================================
// Session Manager
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Disconnected,
    LoggedOut,
    LoggedIn,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Disconnected => write!(f, "Disconnected"),
            SessionStatus::LoggedOut => write!(f, "Connected, logged out"),
            SessionStatus::LoggedIn => write!(f, "Logged in"),
        }
    }
}

/// Handle to one OpenSubtitles session
///
/// Cloning gives another handle to the same session.
#[derive(Clone)]
pub struct SessionManager {
    pub(super) inner: Arc<SessionInner>,
}

pub(super) struct SessionInner {
    pub(super) rpc: XmlRpcClient,
    config: SessionConfig,
    server_info: ServerInfo,
    state: Mutex<SessionState>,
    keep_alive: PeriodicTimer,
}

#[derive(Debug, Default)]
struct SessionState {
    connected: bool,
    token: Option<String>,
    languages: Vec<String>,
    logged_in: bool,
    /// Set by every activity read, cleared by every heartbeat
    active: bool,
}

impl SessionManager {
    /// Connect with default settings
    pub async fn new() -> Result<Self> {
        Self::connect(SessionConfig::default()).await
    }

    /// Handshake with the server. Any failure here is [`SubtleError::Unreachable`].
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        info!("Attempting to connect to OpenSubtitles at {}", config.server_url);

        let rpc = XmlRpcClient::new(
            config.server_url.clone(),
            &config.user_agent,
            config.request_timeout,
        )
        .map_err(|e| SubtleError::Unreachable(e.to_string()))?;

        let response = rpc
            .call("ServerInfo", &[])
            .await
            .map_err(|e| SubtleError::Unreachable(e.to_string()))?;

        let server_info = parse_server_info(&response).ok_or_else(|| {
            SubtleError::Unreachable("unexpected ServerInfo response".to_string())
        })?;
        debug!("Connected to {}", server_info);

        let interval = config.keep_alive;
        let inner = Arc::new_cyclic(|weak: &Weak<SessionInner>| {
            let weak = weak.clone();
            let action: TimerAction = Arc::new(move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        SessionManager { inner }.heartbeat().await;
                    }
                }
                .boxed()
            });

            SessionInner {
                rpc,
                config,
                server_info,
                state: Mutex::new(SessionState {
                    connected: true,
                    ..Default::default()
                }),
                keep_alive: PeriodicTimer::new(interval, action, false),
            }
        });

        Ok(Self { inner })
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.inner.server_info
    }

    /// Snapshot of the state machine. Does not count as activity.
    pub fn status(&self) -> SessionStatus {
        let state = self.state();
        if !state.connected {
            SessionStatus::Disconnected
        } else if state.logged_in {
            SessionStatus::LoggedIn
        } else {
            SessionStatus::LoggedOut
        }
    }

    /// Whether the session is authenticated
    ///
    /// Reading this is treated as activity: it calls [`record_activity`],
    /// which marks the session active and pushes the next keep-alive tick a
    /// full interval out. Use [`status`] for a read without side effects.
    ///
    /// [`record_activity`]: SessionManager::record_activity
    /// [`status`]: SessionManager::status
    pub fn is_logged_in(&self) -> bool {
        self.record_activity()
    }

    /// Mark the session as in use and restart the keep-alive countdown.
    /// Returns the logged-in flag.
    pub fn record_activity(&self) -> bool {
        let mut state = self.state();
        state.active = true;
        if state.logged_in {
            if self.inner.keep_alive.is_running() {
                self.inner.keep_alive.reset();
            } else {
                self.inner.keep_alive.start();
            }
        }
        state.logged_in
    }

    /// Whether the keep-alive timer is currently armed
    pub fn keep_alive_running(&self) -> bool {
        self.inner.keep_alive.is_running()
    }

    /// Preferred subtitle languages, in order
    pub fn languages(&self) -> Vec<String> {
        self.state().languages.clone()
    }

    pub(super) fn token(&self) -> Result<String> {
        self.state().token.clone().ok_or(SubtleError::NotLoggedIn)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.state().connected {
            Ok(())
        } else {
            Err(SubtleError::Unreachable(
                "session has been shut down".to_string(),
            ))
        }
    }

    /// Authenticate. Calling this while logged in does nothing.
    pub async fn login(&self, credentials: &Credentials) -> Result<()> {
        self.ensure_connected()?;

        if self.is_logged_in() {
            info!("Already logged in, ignoring login request");
            return Ok(());
        }

        info!("Logging in as {}...", credentials.username());
        let params = [
            Value::from(credentials.username()),
            Value::from(credentials.password_md5()),
            Value::from(self.languages().join(",")),
            Value::from(self.inner.config.user_agent.as_str()),
        ];

        let response = match self.inner.rpc.call("LogIn", &params).await {
            Ok(response) => response,
            Err(SubtleError::Timeout) => return Err(self.login_timeout()),
            Err(e) => return Err(e),
        };

        let body = ensure_ok(&response).map_err(login_rejection)?;

        let token = body
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SubtleError::LoginFailed("response contained no token".to_string()))?
            .to_string();

        let mut languages = body
            .get("data")
            .and_then(|d| d.get("UserPreferedLanguages"))
            .and_then(Value::as_str)
            .map(split_languages)
            .ok_or_else(|| {
                SubtleError::LoginFailed("response contained no language preferences".to_string())
            })?;
        if languages.is_empty() {
            languages = self.inner.config.fallback_languages.clone();
        }

        {
            let mut state = self.state();
            state.token = Some(token.clone());
            state.languages = languages.clone();
            state.logged_in = true;
            state.active = true;
            self.inner.keep_alive.start();
        }

        debug!("Session token: {}", token);
        info!(
            "Login successful. Preferred language for subtitles set to '{}'",
            languages.join(",")
        );
        Ok(())
    }

    fn login_timeout(&self) -> SubtleError {
        match self.inner.config.login_timeout_policy {
            LoginTimeoutPolicy::Fatal => {
                SubtleError::Unreachable("login request timed out".to_string())
            }
            LoginTimeoutPolicy::Recoverable => SubtleError::Timeout,
        }
    }

    /// End the session. Calling this while logged out does nothing.
    ///
    /// Local state is cleared even when the server rejects the request.
    pub async fn logout(&self) -> Result<()> {
        let token = {
            let state = self.state();
            match (state.logged_in, state.token.clone()) {
                (true, Some(token)) => token,
                _ => {
                    info!("Not logged in, nothing to log out from");
                    return Ok(());
                }
            }
        };

        info!("Logging out...");
        let result = self
            .inner
            .rpc
            .call("LogOut", &[Value::from(token.as_str())])
            .await;
        self.clear_session_if(&token);

        match result {
            Ok(response) => {
                match ensure_ok(&response) {
                    Ok(_) => info!("Successfully logged out"),
                    Err(e) => error!("Logout was not acknowledged: {}", e),
                }
                Ok(())
            }
            Err(e) => {
                error!("Logout failed: {}", e);
                Err(e)
            }
        }
    }

    /// Log out (best effort) and refuse any further logins
    pub async fn shutdown(&self) {
        if let Err(e) = self.logout().await {
            warn!("Logout during shutdown failed: {}", e);
        }
        self.state().connected = false;
    }

    /// Drop the local session, but only if it still belongs to `token`.
    /// A reply for a session that was since replaced by a new login is ignored.
    fn clear_session_if(&self, token: &str) -> bool {
        let mut state = self.state();
        if state.token.as_deref() != Some(token) {
            debug!("Session changed while a request was in flight, keeping the new one");
            return false;
        }
        state.token = None;
        state.logged_in = false;
        state.active = false;
        self.inner.keep_alive.stop();
        true
    }

    /// Keep-alive tick
    ///
    /// If nothing touched the session since the previous tick and idle logout
    /// is enabled, the session is ended instead of extended. A rejected
    /// NoOperation drops the session locally.
    pub async fn heartbeat(&self) {
        let (token, was_active) = {
            let mut state = self.state();
            if !state.logged_in {
                return;
            }
            let was_active = state.active;
            state.active = false;
            (state.token.clone(), was_active)
        };

        let Some(token) = token else {
            return;
        };

        if !was_active && self.inner.config.idle_logout {
            warn!("Session idle for a full keep-alive interval, logging out");
            if let Err(e) = self.logout().await {
                warn!("Idle logout failed: {}", e);
            }
            return;
        }

        match self
            .inner
            .rpc
            .call("NoOperation", &[Value::from(token.as_str())])
            .await
        {
            Ok(response) => match ensure_ok(&response) {
                Ok(_) => debug!("Staying alive..."),
                Err(e) => {
                    if self.clear_session_if(&token) {
                        warn!(
                            "Your session timed out ({}), please log in again before doing anything else",
                            e
                        );
                    }
                }
            },
            Err(e) => warn!("Keep-alive request failed: {}", e),
        }
    }

    /// Ask the server which movie a fingerprint belongs to
    ///
    /// On a match the video is enriched in place and the match returned.
    pub async fn get_video_info(&self, video: &mut VideoIdentity) -> Result<Option<MovieMatch>> {
        if !self.is_logged_in() {
            debug!("Video lookup skipped: not logged in");
            return Ok(None);
        }

        let Some(hash) = video.fingerprint().hex() else {
            debug!(
                "Video lookup skipped: {} has no usable fingerprint ({})",
                video.file_name(),
                video.fingerprint()
            );
            return Ok(None);
        };

        let token = self.token()?;
        let response = self
            .inner
            .rpc
            .call(
                "CheckMovieHash",
                &[Value::from(token), Value::Array(vec![Value::from(hash.as_str())])],
            )
            .await?;
        let body = ensure_ok(&response)?;

        let entry = body
            .get("data")
            .and_then(|d| d.get(&hash))
            .and_then(Value::as_struct)
            .filter(|m| !m.is_empty());

        let Some(entry) = entry else {
            info!("Sorry, couldn't find any movie matching {}", video.file_name());
            return Ok(None);
        };

        let text = |key: &str| {
            entry
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let movie = MovieMatch {
            imdb_id: text("MovieImdbID"),
            title: text("MovieName"),
            year: entry
                .get("MovieYear")
                .and_then(Value::coerce_i64)
                .and_then(|y| u16::try_from(y).ok()),
        };

        if movie.imdb_id.is_empty() {
            return Err(SubtleError::Malformed(
                "movie match without MovieImdbID".to_string(),
            ));
        }

        info!("{} identified as {}", video.file_name(), movie);
        video.set_movie(movie.clone());
        Ok(Some(movie))
    }
}

/// A 4xx LogIn status means the request itself was refused (bad
/// credentials, banned user agent). Anything else is passed through.
fn login_rejection(err: SubtleError) -> SubtleError {
    match err {
        SubtleError::ProtocolStatus(status) if is_client_error(&status) => {
            SubtleError::LoginFailed(status)
        }
        other => other,
    }
}

fn is_client_error(status: &str) -> bool {
    status
        .split_whitespace()
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .is_some_and(|code| (400..500).contains(&code))
}

/// Split "eng,dut" into an ordered, de-duplicated list
fn split_languages(raw: &str) -> Vec<String> {
    let mut languages: Vec<String> = Vec::new();
    for lang in raw.split(',').map(str::trim).filter(|l| !l.is_empty()) {
        if !languages.iter().any(|l| l == lang) {
            languages.push(lang.to_string());
        }
    }
    languages
}

fn parse_server_info(response: &Value) -> Option<ServerInfo> {
    let body = response.as_struct()?;
    let text = |key: &str| body.get(key).and_then(Value::as_str).map(str::to_string);
    let number = |key: &str| body.get(key).and_then(Value::coerce_i64);

    Some(ServerInfo {
        application: text("application"),
        xmlrpc_version: text("xmlrpc_version"),
        users_online: number("users_online_total"),
        subtitle_files: number("subs_subtitle_files"),
        movies_total: number("movies_total"),
    })
}
