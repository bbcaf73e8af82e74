//! Configuration management for portal binaries.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default backend URL (can be overridden at compile time via PORTAL_API_URL env var).
pub const DEFAULT_API_BASE_URL: &str = match option_env!("PORTAL_API_URL") {
    Some(url) => url,
    None => "http://localhost:3000/api/",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Path segment that marks the management area of the front end.
pub const DEFAULT_MANAGEMENT_KEYWORD: &str = "system-manager";

/// Tokens with less than this many seconds left are refreshed at once.
pub const DEFAULT_REFRESH_IMMEDIATE_SECS: u64 = 300;

/// Proactive refresh fires this many seconds before expiry.
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 180;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Main portal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the REST backend; API and auth paths are joined onto it.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Reserved path segment for the management area.
    #[serde(default = "default_management_keyword")]
    pub management_keyword: String,
    #[serde(default = "default_refresh_immediate_secs")]
    pub refresh_immediately_within_secs: u64,
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_management_keyword() -> String {
    DEFAULT_MANAGEMENT_KEYWORD.to_string()
}

fn default_refresh_immediate_secs() -> u64 {
    DEFAULT_REFRESH_IMMEDIATE_SECS
}

fn default_refresh_margin_secs() -> u64 {
    DEFAULT_REFRESH_MARGIN_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_base_url: default_api_base_url(),
            management_keyword: default_management_keyword(),
            refresh_immediately_within_secs: DEFAULT_REFRESH_IMMEDIATE_SECS,
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file if present, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `PORTAL_*` overrides. Empty values and unparseable numbers are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(level) = read("PORTAL_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = read("PORTAL_API_URL") {
            self.api_base_url = url;
        }
        if let Some(secs) = read("PORTAL_REFRESH_IMMEDIATE_SECS").and_then(|v| v.parse().ok()) {
            self.refresh_immediately_within_secs = secs;
        }
        if let Some(secs) = read("PORTAL_REFRESH_MARGIN_SECS").and_then(|v| v.parse().ok()) {
            self.refresh_margin_secs = secs;
        }
    }

    /// Get the backend base URL, normalized to end with `/` so relative
    /// endpoint paths join underneath it.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        let raw = if self.api_base_url.ends_with('/') {
            self.api_base_url.clone()
        } else {
            format!("{}/", self.api_base_url)
        };
        let url = Url::parse(&raw)?;
        if url.cannot_be_a_base() {
            return Err(CoreError::Config(format!(
                "API base URL cannot be a base: {}",
                self.api_base_url
            )));
        }
        Ok(url)
    }
}
