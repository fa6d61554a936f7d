//! Logging Configuration
//!
//! All settings are loaded from environment variables. Log output always goes
//! to stderr: stdout carries the export stream.

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directives (default: RUST_LOG, else "info")
    pub filter: String,
    /// Output format (TAP_LOG_FORMAT=json|text, default: text)
    pub format: LogFormat,
    /// ANSI colors in text output (TAP_LOG_ANSI, default: false)
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl LogConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        LogConfig {
            filter: std::env::var("RUST_LOG")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "info".to_string()),
            format: Self::parse_format(std::env::var("TAP_LOG_FORMAT").ok().as_deref()),
            ansi: std::env::var("TAP_LOG_ANSI")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    fn parse_format(value: Option<&str>) -> LogFormat {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}
