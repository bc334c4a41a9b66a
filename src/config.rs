//! Configuration management for Subtle
//!
//! Handles config file loading, credential lookup and hashing of a
//! plaintext password left in the file.
//! Config is stored at ~/.config/subtle/config.toml

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::session::{md5_hex, Credentials, LoginTimeoutPolicy, SessionConfig};

pub const ENV_USERNAME: &str = "SUBTLE_USERNAME";
pub const ENV_PASSWORD: &str = "SUBTLE_PASSWORD";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OpenSubtitles account name
    pub username: Option<String>,
    /// Plaintext password, replaced by `password_md5` on save
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub password_md5: Option<String>,
    /// XML-RPC endpoint override
    pub server_url: Option<String>,
    pub user_agent: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    /// Log out after a keep-alive interval without activity (default: true)
    pub idle_logout: Option<bool>,
    pub login_timeout_policy: Option<LoginTimeoutPolicy>,
    /// Default result limit for searches
    pub search_limit: Option<u32>,
}

impl Config {
    /// Get config file path (~/.config/subtle/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("subtle").join("config.toml"))
    }

    /// Load config from the default path, or return default if not found.
    /// Environment overrides are applied on top.
    pub fn load() -> Self {
        let mut config = Self::path()
            .and_then(|p| Self::load_from(&p).ok())
            .unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load config from an explicit file
    ///
    /// A plaintext `password` found in the file is replaced by its MD5 and
    /// the file is rewritten, so the password is only ever read once.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        if let Some(password) = config.password.take() {
            config.password_md5 = Some(md5_hex(&password));
            match config.save_to(path) {
                Ok(()) => info!("Replaced plaintext password in {}", path.display()),
                Err(e) => warn!("Could not rewrite {}: {:#}", path.display(), e),
            }
        }
        Ok(config)
    }

    /// Override credentials from `SUBTLE_USERNAME` / `SUBTLE_PASSWORD`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(username) = lookup(ENV_USERNAME).filter(|u| !u.is_empty()) {
            self.username = Some(username);
        }
        if let Some(password) = lookup(ENV_PASSWORD).filter(|p| !p.is_empty()) {
            self.password = Some(password);
            self.password_md5 = None;
        }
    }

    /// Save config to `path`. A plaintext password is written as its MD5.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut stored = self.clone();
        if let Some(password) = stored.password.take() {
            stored.password_md5 = Some(md5_hex(&password));
        }

        let toml = toml::to_string_pretty(&stored)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Login credentials, if a username and some form of password are set
    pub fn credentials(&self) -> Option<Credentials> {
        let username = self.username.clone()?;
        match (&self.password, &self.password_md5) {
            (Some(password), _) => Some(Credentials::new(username, password)),
            (None, Some(md5)) => Some(Credentials::from_md5(username, md5.clone())),
            (None, None) => None,
        }
    }

    /// Session settings with defaults for anything not configured
    pub fn to_session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            server_url: self.server_url.clone().unwrap_or(defaults.server_url),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            keep_alive: self
                .keep_alive_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.keep_alive),
            request_timeout: self
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            idle_logout: self.idle_logout.unwrap_or(defaults.idle_logout),
            login_timeout_policy: self
                .login_timeout_policy
                .unwrap_or(defaults.login_timeout_policy),
            fallback_languages: defaults.fallback_languages,
        }
    }
}
