//! Error types for a tap run
//!
//! Two layers:
//! - `SyncError`: per-identity / per-item failures. Logged and isolated,
//!   never abort a sibling worker or stream.
//! - `TapError`: run-level failures that end the process with a non-zero exit.

use crate::config::ConfigError;
use crate::protocol::ExportError;
use crate::remote::RemoteError;
use std::io::Error as IoError;

/// Failure while syncing one identity (or one item of an identity)
#[derive(Debug)]
pub enum SyncError {
    /// Player string is not exactly `gameName#tagLine`
    InvalidIdentity(String),
    /// Persisted watermark could not be parsed as `YYYY-MM-DD`
    InvalidWatermark { player: String, value: String },
    /// Error surfaced by the remote client, passed through unchanged
    Remote(RemoteError),
    /// The export actor rejected or dropped a checkpoint
    Export(ExportError),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::InvalidIdentity(player) => write!(f, "Invalid player id: {}", player),
            SyncError::InvalidWatermark { player, value } => {
                write!(f, "Invalid start date: {} for player: {}", value, player)
            }
            SyncError::Remote(e) => write!(f, "Remote error: {}", e),
            SyncError::Export(e) => write!(f, "Export error: {}", e),
        }
    }
}

impl std::error::Error for SyncError {}

impl SyncError {
    /// Whether retrying the same player on a later run may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Remote(e) if e.is_transient())
    }
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        SyncError::Remote(e)
    }
}

impl From<ExportError> for SyncError {
    fn from(e: ExportError) -> Self {
        SyncError::Export(e)
    }
}

/// Fatal, run-level error
#[derive(Debug)]
pub enum TapError {
    /// Missing or invalid configuration; raised before any worker starts
    Config(ConfigError),
    /// Catalog file unreadable or names an unknown stream
    Catalog(String),
    /// Prior state file unreadable
    State(String),
    /// The export sink failed
    Export(ExportError),
    /// Every remote request of the run failed
    SourceUnreachable { failures: u64 },
    /// Other I/O error
    Io(IoError),
}

impl std::fmt::Display for TapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TapError::Config(e) => write!(f, "Configuration error: {}", e),
            TapError::Catalog(msg) => write!(f, "Catalog error: {}", msg),
            TapError::State(msg) => write!(f, "State error: {}", msg),
            TapError::Export(e) => write!(f, "Export error: {}", e),
            TapError::SourceUnreachable { failures } => write!(
                f,
                "Remote source unreachable: all {} requests failed",
                failures
            ),
            TapError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for TapError {}

impl From<ConfigError> for TapError {
    fn from(e: ConfigError) -> Self {
        TapError::Config(e)
    }
}

impl From<ExportError> for TapError {
    fn from(e: ExportError) -> Self {
        TapError::Export(e)
    }
}

impl From<IoError> for TapError {
    fn from(e: IoError) -> Self {
        TapError::Io(e)
    }
}
