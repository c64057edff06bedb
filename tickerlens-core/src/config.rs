//! Pipeline configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) gives the stock
//! setup: 1s pacing, 3 attempts with 2s linear backoff, 10s per-attempt
//! timeout, 15-minute fresh window, the default 20-company roster.
//!
//! ```toml
//! [fetch]
//! pacing_ms = 1000
//! retry_delay_ms = 2000
//! max_attempts = 3
//! timeout_secs = 10
//! backoff = "linear"
//!
//! [cache]
//! fresh_ttl_secs = 900
//!
//! [[roster]]
//! name = "Apple Inc."
//! ticker = "AAPL"
//! ```

use crate::data::yahoo::{DEFAULT_BASE_URL, DEFAULT_COOKIE_URL};
use crate::data::{Backoff, RetryPolicy};
use crate::domain::{Roster, RosterEntry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerlensConfig {
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub provider: ProviderConfig,
    /// Replaces the default roster when present.
    pub roster: Option<Vec<RosterEntry>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub pacing_ms: u64,
    pub retry_delay_ms: u64,
    pub max_attempts: u32,
    pub timeout_secs: u64,
    pub backoff: Backoff,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 1000,
            retry_delay_ms: 2000,
            max_attempts: 3,
            timeout_secs: 10,
            backoff: Backoff::Linear,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub fresh_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fresh_ttl_secs: 15 * 60,
        }
    }
}

impl CacheConfig {
    pub fn fresh_ttl(&self) -> Duration {
        Duration::from_secs(self.fresh_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub cookie_url: String,
    /// Also call quoteSummary for market cap, P/E, dividend yield and the
    /// business summary.
    pub fetch_summary: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            cookie_url: DEFAULT_COOKIE_URL.to_string(),
            fetch_summary: true,
        }
    }
}

impl TickerlensConfig {
    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.max_attempts == 0 {
            return Err(ConfigError::Invalid("fetch.max_attempts must be >= 1".into()));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Invalid("fetch.timeout_secs must be >= 1".into()));
        }
        if matches!(&self.roster, Some(entries) if entries.is_empty()) {
            return Err(ConfigError::Invalid("roster must not be empty".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch.max_attempts,
            Duration::from_millis(self.fetch.retry_delay_ms),
            Duration::from_millis(self.fetch.pacing_ms),
        )
        .with_backoff(self.fetch.backoff)
        .with_attempt_timeout(self.fetch.timeout())
    }

    pub fn roster(&self) -> Roster {
        match &self.roster {
            Some(entries) => Roster::new(entries.clone()),
            None => Roster::default_roster(),
        }
    }
}
