//! Run Configuration
//!
//! Loaded once per run from a JSON file (or TOML when the path ends in
//! `.toml`) and consumed read-only by the sync engine.
//!
//! ```json
//! {
//!   "api_keys": ["RGAPI-..."],
//!   "server": "euw1",
//!   "players": ["Faker#KR1"],
//!   "start_date": "2024-01-01",
//!   "queue_id": 420
//! }
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Date format used for `start_date` and every watermark
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Error type for configuration loading and validation
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read
    Io(std::io::Error),
    /// Config file could not be decoded
    Parse(String),
    /// A required field is absent or empty
    MissingField(&'static str),
    /// A field is present but has an unusable value
    InvalidField { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to open config file: {}", e),
            ConfigError::Parse(msg) => write!(f, "failed to decode config: {}", msg),
            ConfigError::MissingField(field) => write!(f, "missing required field: {}", field),
            ConfigError::InvalidField { field, reason } => {
                write!(f, "invalid value for {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

/// Published rate limit of one API key
///
/// Default is the development-key budget: 100 requests per 120 seconds, with
/// a 200ms safety margin added to every pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub margin_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            requests_per_window: 100,
            window_secs: 120,
            margin_ms: 200,
        }
    }
}

impl RateLimitConfig {
    /// Minimum delay between two requests on the same key
    pub fn pacing_interval(&self) -> Duration {
        let requests = u64::from(self.requests_per_window.max(1));
        let window_ms = self.window_secs.saturating_mul(1000);
        Duration::from_millis(window_ms / requests + self.margin_ms)
    }
}

/// Tap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapConfig {
    /// One lane per key
    pub api_keys: Vec<String>,
    /// Platform routing value, e.g. `euw1`
    pub server: String,
    /// Regional routing override (`europe`, `americas`, `asia`, `sea`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Tracked players as `gameName#tagLine`
    #[serde(default)]
    pub players: Vec<String>,
    /// Global start date used when a player has no watermark
    #[serde(default)]
    pub start_date: String,
    /// Only list matches of this queue (e.g. 420 for ranked solo)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<u32>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl TapConfig {
    /// Read and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let config: TapConfig = if is_toml {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Check required fields. Any error here aborts the run before a worker starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_keys.is_empty() {
            return Err(ConfigError::MissingField("api_keys"));
        }
        if self.api_keys.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::InvalidField {
                field: "api_keys",
                reason: "empty key".to_string(),
            });
        }
        if self.server.trim().is_empty() {
            return Err(ConfigError::MissingField("server"));
        }
        if self.start_date.is_empty() {
            return Err(ConfigError::MissingField("start_date"));
        }
        self.start_date()?;
        if self.rate_limit.requests_per_window == 0 {
            return Err(ConfigError::InvalidField {
                field: "rate_limit.requests_per_window",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Parsed global start date
    pub fn start_date(&self) -> Result<NaiveDate, ConfigError> {
        NaiveDate::parse_from_str(&self.start_date, DATE_FORMAT).map_err(|e| {
            ConfigError::InvalidField {
                field: "start_date",
                reason: format!("{} ({})", self.start_date, e),
            }
        })
    }

    /// Config for tests: one key, no players
    pub fn test() -> Self {
        TapConfig {
            api_keys: vec!["test-key".to_string()],
            server: "euw1".to_string(),
            region: None,
            players: Vec::new(),
            start_date: "2024-01-01".to_string(),
            queue_id: None,
            rate_limit: RateLimitConfig::default(),
        }
    }
}
