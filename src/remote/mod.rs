//! Remote data source abstraction
//!
//! The sync engine only talks to the Riot API through `RemoteDataClient`, one
//! client per API key. Implementations:
//! - `HttpRemoteClient`: reqwest against the real API (feature `http`)
//! - `SimulatedRemote`: in-memory world with deterministic fault injection,
//!   for unit tests and DST

#[cfg(feature = "http")]
pub mod http;
pub mod simulated;

#[cfg(feature = "http")]
pub use http::{HttpClientFactory, HttpRemoteClient};
pub use simulated::{SimulatedClientFactory, SimulatedRemote, SimulatedRemoteConfig};

use crate::records::{Account, LeagueEntry, RawTimeline};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Maximum page size accepted by the match-v5 ids endpoint
pub const MATCH_IDS_PAGE_SIZE: u32 = 100;

/// Error type for remote operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Resource does not exist (HTTP 404)
    NotFound(String),
    /// Key budget exhausted (HTTP 429)
    RateLimited { retry_after_secs: Option<u64> },
    /// Network failure or non-success status
    Transport(String),
    /// Response body could not be decoded
    MalformedResponse(String),
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::NotFound(what) => write!(f, "not found: {}", what),
            RemoteError::RateLimited {
                retry_after_secs: Some(secs),
            } => write!(f, "rate limited (retry after {}s)", secs),
            RemoteError::RateLimited {
                retry_after_secs: None,
            } => write!(f, "rate limited"),
            RemoteError::Transport(msg) => write!(f, "transport error: {}", msg),
            RemoteError::MalformedResponse(msg) => write!(f, "malformed response: {}", msg),
        }
    }
}

impl std::error::Error for RemoteError {}

impl RemoteError {
    /// Network/5xx-class failures, including rate limiting
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Transport(_) | RemoteError::RateLimited { .. }
        )
    }
}

/// One page request against the match-id listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchIdsQuery {
    /// Only matches that started at or after this Unix time (seconds)
    pub start_time: i64,
    /// Queue filter
    pub queue: Option<u32>,
    /// Offset into the listing
    pub start: u32,
    pub count: u32,
}

pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Remote data source, bound to one credential
pub trait RemoteDataClient: Send + Sync + 'static {
    /// Resolve a Riot ID to its account
    fn account_by_riot_id<'a>(
        &'a self,
        game_name: &'a str,
        tag_line: &'a str,
    ) -> RemoteFuture<'a, Account>;

    /// One page of match ids, most recent first, as ordered by the source
    fn match_ids_page<'a>(
        &'a self,
        puuid: &'a str,
        query: &'a MatchIdsQuery,
    ) -> RemoteFuture<'a, Vec<String>>;

    /// Full match detail
    fn match_detail<'a>(&'a self, match_id: &'a str) -> RemoteFuture<'a, Value>;

    /// Current league entries of a player
    fn league_entries<'a>(&'a self, puuid: &'a str) -> RemoteFuture<'a, Vec<LeagueEntry>>;

    /// Frame/event timeline of a match
    fn match_timeline<'a>(&'a self, match_id: &'a str) -> RemoteFuture<'a, RawTimeline>;
}

/// Builds the client for one credential
pub trait ClientFactory: Send + Sync + 'static {
    fn connect(&self, api_key: &str) -> Result<Arc<dyn RemoteDataClient>, RemoteError>;
}
