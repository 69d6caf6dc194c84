//! Error types for embedscout.
//!
//! Uses `thiserror` for structured error definitions that provide
//! clear context about what went wrong.

use thiserror::Error;

/// Error type for a single HTTP fetch issued through a session.
#[derive(Error, Debug)]
pub enum FetchError {
    /// URL parsing or validation failed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Connection could not be established or was dropped
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete within the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Server answered with a non-success status
    #[error("HTTP {code} for {url}")]
    HttpStatus { code: u16, url: String },

    /// A challenge-protected fetch was requested but no solver is configured
    #[error("No challenge solver configured")]
    ChallengeUnavailable,

    /// The challenge solver gave up
    #[error("Challenge solving failed: {0}")]
    Challenge(String),
}

impl FetchError {
    /// Returns the HTTP status code for status errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus {
                code: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Error type for a whole link resolution run.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The episode page itself could not be fetched
    #[error("Episode page unavailable: {url}")]
    PageUnavailable {
        url: String,
        #[source]
        source: FetchError,
    },
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
