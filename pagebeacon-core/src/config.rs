//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/pagebeacon/config.toml`. When the
//! engine is embedded in a page, the same [`TrackerConfig`] is produced from
//! the instrumentation tag's `data-*` attributes instead, see
//! [`TrackerConfig::from_script_attributes`].
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/pagebeacon/` (~/.config/pagebeacon/)
//! - Data: `$XDG_DATA_HOME/pagebeacon/` (~/.local/share/pagebeacon/)
//! - State/Logs: `$XDG_STATE_HOME/pagebeacon/` (~/.local/state/pagebeacon/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Path appended to the collector host to form the endpoint.
pub const COLLECT_API_ENDPOINT: &str = "/api/send";

const APP_DIR: &str = "pagebeacon";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `$var/pagebeacon`, or `~/<fallback>/pagebeacon` when the variable is
/// unset or empty
fn xdg_app_dir(var: &str, fallback: &str) -> PathBuf {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(fallback))
        .join(APP_DIR)
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Tracker behaviour (website id, endpoint host, auto-tracking)
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tracker configuration
///
/// Mirrors the attributes an embedding tag carries. Only their effects are
/// consumed by the engine.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Website identifier sent with every payload
    pub website_id: Option<String>,

    /// Collector host (e.g., `https://stats.example.com`)
    pub host_url: Option<String>,

    /// URL the tracker script was loaded from; its directory is the
    /// fallback host when `host_url` is unset
    pub script_src: Option<String>,

    /// Free-form tag attached to every payload
    pub tag: Option<String>,

    /// Arm the watchers and send the initial page view
    #[serde(default = "default_auto_track")]
    pub auto_track: bool,

    /// Drop the query string from tracked URLs
    #[serde(default)]
    pub exclude_search: bool,

    /// Hostnames tracking is allowed on (empty = everywhere)
    #[serde(default)]
    pub domains: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            website_id: None,
            host_url: None,
            script_src: None,
            tag: None,
            auto_track: default_auto_track(),
            exclude_search: false,
            domains: vec![],
        }
    }
}

fn default_auto_track() -> bool {
    true
}

impl TrackerConfig {
    /// Build the configuration from the instrumentation tag's attributes.
    ///
    /// `data-auto-track` is on unless it is exactly `"false"`;
    /// `data-exclude-search` is on only when it is exactly `"true"`.
    pub fn from_script_attributes(attrs: &HashMap<String, String>) -> Self {
        let attr = |name: &str| attrs.get(name).filter(|v| !v.is_empty()).cloned();

        let domains = attr("data-domains")
            .map(|list| {
                list.split(',')
                    .map(|d| d.trim().to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Self {
            website_id: attr("data-website-id"),
            host_url: attr("data-host-url"),
            script_src: attr("src"),
            tag: attr("data-tag"),
            auto_track: attrs.get("data-auto-track").map(String::as_str) != Some("false"),
            exclude_search: attrs.get("data-exclude-search").map(String::as_str) == Some("true"),
            domains,
        }
    }

    /// Resolve the collection endpoint URL.
    pub fn endpoint(&self) -> Result<String> {
        let host = match (&self.host_url, &self.script_src) {
            (Some(host), _) => host.clone(),
            (None, Some(src)) => match src.rfind('/') {
                Some(idx) => src[..idx].to_string(),
                None => String::new(),
            },
            (None, None) => {
                return Err(Error::Config(
                    "tracker.host_url or tracker.script_src is required".to_string(),
                ))
            }
        };

        let host = host.strip_suffix('/').unwrap_or(&host);
        if host.is_empty() {
            return Err(Error::Config(
                "unable to derive a collector host".to_string(),
            ));
        }
        Ok(format!("{}{}", host, COLLECT_API_ENDPOINT))
    }

    /// Validate configuration loaded from a file
    pub fn validate(&self) -> Result<()> {
        if self.website_id.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Config("tracker.website_id is required".to_string()));
        }
        self.endpoint().map(|_| ())
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// How often the log file rolls over
    #[serde(default)]
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            rotation: LogRotation::default(),
        }
    }
}

/// Log file rollover period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/pagebeacon/config.toml` (~/.config/pagebeacon/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_app_dir("XDG_CONFIG_HOME", ".config").join("config.toml")
    }

    /// Returns the data directory path (for persisted cookies)
    ///
    /// `$XDG_DATA_HOME/pagebeacon/` (~/.local/share/pagebeacon/)
    pub fn data_dir() -> PathBuf {
        xdg_app_dir("XDG_DATA_HOME", ".local/share")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/pagebeacon/` (~/.local/state/pagebeacon/)
    pub fn state_dir() -> PathBuf {
        xdg_app_dir("XDG_STATE_HOME", ".local/state")
    }

    /// Returns the cookie jar file path
    ///
    /// `$XDG_DATA_HOME/pagebeacon/cookies.json`
    pub fn cookie_jar_path() -> PathBuf {
        Self::data_dir().join("cookies.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/pagebeacon/pagebeacon.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("pagebeacon.log")
    }
}
