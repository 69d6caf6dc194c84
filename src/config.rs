//! Configuration management for embedscout.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::cookies::CookieScoping;
use crate::error::ConfigError;
use crate::resolver::VendorProfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "Embedscout";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Longest accepted pause between requests, in seconds.
const MAX_REQUEST_DELAY_SEC: f64 = 3600.0;

/// Browser User-Agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP transport settings.
    pub http: HttpConfig,

    /// Cookie jar behaviour.
    pub cookies: CookieConfig,

    /// Link resolution settings.
    pub resolver: ResolverConfig,

    /// Known vendor JSON APIs, matched by host marker.
    pub vendors: Vec<VendorProfile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            cookies: CookieConfig::default(),
            resolver: ResolverConfig::default(),
            vendors: VendorProfile::defaults(),
        }
    }
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// User-Agent header for all requests.
    pub user_agent: String,

    /// Per-request timeout in seconds.
    pub timeout_sec: u64,

    /// Delay between web requests in seconds.
    pub delay_between_requests_sec: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_sec: 30,
            delay_between_requests_sec: 0.0,
        }
    }
}

/// Cookie jar configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    /// `global_by_name` shares every cookie with every origin; `strict`
    /// matches by domain and path.
    pub scoping: CookieScoping,

    /// Filename tokens used to pick a Netscape cookie file from the config
    /// directory. Empty disables the import.
    pub import_tokens: Vec<String>,
}

/// Link resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// How many embeds are resolved at the same time. 1 keeps emission in
    /// discovery order.
    pub concurrency: usize,

    /// Fetch episode pages through the challenge solver.
    pub page_via_challenge: bool,

    /// Enable verbose resolver logging.
    pub debug: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            page_via_challenge: false,
            debug: false,
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "resolver.concurrency".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.http.timeout_sec == 0 {
            return Err(ConfigError::InvalidValue {
                key: "http.timeout_sec".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        let delay = self.http.delay_between_requests_sec;
        if !delay.is_finite() || !(0.0..=MAX_REQUEST_DELAY_SEC).contains(&delay) {
            return Err(ConfigError::InvalidValue {
                key: "http.delay_between_requests_sec".to_string(),
                message: format!("must be between 0 and {} seconds", MAX_REQUEST_DELAY_SEC),
            });
        }

        for (idx, vendor) in self.vendors.iter().enumerate() {
            if vendor.host.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("vendors[{}].host", idx),
                    message: "must not be empty".to_string(),
                });
            }
            if !vendor.api_endpoint.contains("{id}") {
                return Err(ConfigError::InvalidValue {
                    key: format!("vendors[{}].api_endpoint", idx),
                    message: "must contain an {id} placeholder".to_string(),
                });
            }
        }

        Ok(())
    }
}
