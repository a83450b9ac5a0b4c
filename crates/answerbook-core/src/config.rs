//! Application configuration management.
//!
//! Two layers of configuration exist:
//!
//! - `Config`: user preferences and the offline cache surface (locale, app
//!   origin, cache version tag, asset manifest, bypass hosts). Stored at
//!   `~/.config/answerbook/config.json`; a missing file means defaults.
//! - `RemoteConfig`: document store credentials read from the environment.
//!   Missing credentials are fatal: the app refuses to start.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::locale::Locale;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "answerbook";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Current generation of the static asset cache.
/// Bump whenever the manifest contents change so old buckets get retired.
pub const DEFAULT_CACHE_VERSION: &str = "answer-book-cache-v7";

/// Origin the relative manifest entries are resolved against.
const DEFAULT_ORIGIN: &str = "http://localhost:5173/";

/// Seconds between polls of the REST store when emulating live listeners.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Static assets precached at install time.
pub const DEFAULT_MANIFEST: &[&str] = &[
    "./",
    "./index.html",
    "./style.css",
    "./script.js",
    "./manifest.json",
    "./icons/icon-192x192.png",
    "./icons/icon-512x512.png",
];

/// Hosts that are always fetched live: identity, store transport and CDNs.
pub const DEFAULT_BYPASS_HOSTS: &[&str] = &[
    "googleapis.com",
    "gstatic.com",
    "cdn.tailwindcss.com",
    "unpkg.com",
];

const ENV_API_KEY: &str = "ANSWERBOOK_FIREBASE_API_KEY";
const ENV_PROJECT_ID: &str = "ANSWERBOOK_FIREBASE_PROJECT_ID";
const ENV_APP_ID: &str = "ANSWERBOOK_APP_ID";
const DEFAULT_APP_ID: &str = "my-answer-book-app";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub locale: Locale,
    pub origin: String,
    pub cache_version: String,
    pub manifest: Vec<String>,
    pub bypass_hosts: Vec<String>,
    pub last_email: Option<String>,
    pub poll_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            origin: DEFAULT_ORIGIN.to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
            bypass_hosts: DEFAULT_BYPASS_HOSTS.iter().map(|s| s.to_string()).collect(),
            last_email: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Service unavailable: missing required setting {0}")]
    MissingCredential(&'static str),
}

/// Credentials for the remote document store and identity provider.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub api_key: String,
    pub project_id: String,
    pub app_id: String,
}

impl RemoteConfig {
    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingCredential(key))
        };

        Ok(Self {
            api_key: required(ENV_API_KEY)?,
            project_id: required(ENV_PROJECT_ID)?,
            app_id: lookup(ENV_APP_ID)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_APP_ID.to_string()),
        })
    }
}
