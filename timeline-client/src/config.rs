//! Configuration loading for the timeline sync engine.
//!
//! Configuration is loaded from a TOML file (default: `timeline.toml`).
//! Every section and every key is optional.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Cache storage configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Remote fetch configuration.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Update polling configuration.
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Cache storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Remote fetch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Entries per page (default: 50).
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    /// Attempts per remote call, including the first (default: 3).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay before the first retry in milliseconds (default: 250).
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

/// Update polling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Poll interval for non-profile timelines in milliseconds (default: 10s).
    #[serde(default = "default_feed_interval_ms")]
    pub feed_interval_ms: u64,
    /// Poll interval for profile timelines in milliseconds (default: 15s).
    #[serde(default = "default_profile_interval_ms")]
    pub profile_interval_ms: u64,
}

// Default value functions

fn default_database_path() -> PathBuf {
    PathBuf::from("timeline.db")
}

fn default_max_connections() -> u32 {
    4
}

fn default_page_limit() -> u32 {
    50
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

fn default_feed_interval_ms() -> u64 {
    10_000
}

fn default_profile_interval_ms() -> u64 {
    15_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            feed_interval_ms: default_feed_interval_ms(),
            profile_interval_ms: default_profile_interval_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Retry policy for remote calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch.retry_attempts,
            Duration::from_millis(self.fetch.retry_base_delay_ms),
        )
    }

    /// Poll interval for non-profile timelines.
    pub fn feed_interval(&self) -> Duration {
        Duration::from_millis(self.polling.feed_interval_ms)
    }

    /// Poll interval for profile timelines.
    pub fn profile_interval(&self) -> Duration {
        Duration::from_millis(self.polling.profile_interval_ms)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
