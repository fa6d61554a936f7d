//! Credential Lane
//!
//! One lane per API key. Every remote request made on behalf of the lane's
//! shard goes through `request()`, which holds the lane gate for the request
//! and the pacing pause that follows it (success or failure). Requests through
//! one lane are therefore strictly sequential and spaced by the pacing
//! interval, regardless of how many callers share the lane.
//!
//! ```text
//! worker ──► gate.lock() ──► RemoteDataClient ──► pacer.pause() ──► unlock
//! ```
//!
//! Malformed Riot IDs are rejected before the gate, so they cost no budget.

use crate::error::SyncError;
use crate::identity::RiotId;
use crate::pacing::Pacer;
use crate::records::{Account, LeagueEntry, MatchTimeline, RankingSnapshot, RawTimeline};
use crate::remote::{
    MatchIdsQuery, RemoteDataClient, RemoteError, RemoteFuture, MATCH_IDS_PAGE_SIZE,
};
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Request counters for one lane
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneStats {
    pub successes: u64,
    pub failures: u64,
}

/// Paced access channel bound to one API key
pub struct CredentialLane {
    index: usize,
    client: Arc<dyn RemoteDataClient>,
    pacer: Arc<dyn Pacer>,
    gate: tokio::sync::Mutex<()>,
    accounts: Mutex<HashMap<String, Account>>,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl CredentialLane {
    pub fn new(index: usize, client: Arc<dyn RemoteDataClient>, pacer: Arc<dyn Pacer>) -> Self {
        CredentialLane {
            index,
            client,
            pacer,
            gate: tokio::sync::Mutex::new(()),
            accounts: Mutex::new(HashMap::new()),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn stats(&self) -> LaneStats {
        LaneStats {
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    /// Run one remote request under the gate, then pause
    async fn request<'a, T, F>(&'a self, call: F) -> Result<T, RemoteError>
    where
        F: FnOnce(&'a dyn RemoteDataClient) -> RemoteFuture<'a, T>,
        T: 'a,
    {
        let _gate = self.gate.lock().await;
        let result = call(self.client.as_ref()).await;
        match &result {
            Ok(_) => self.successes.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failures.fetch_add(1, Ordering::Relaxed),
        };
        self.pacer.pause().await;
        result
    }

    /// Resolve a player's account. Successful lookups are cached for the run.
    pub async fn account(&self, player: &str) -> Result<Account, SyncError> {
        let cached = self.accounts.lock().get(player).cloned();
        match cached {
            Some(account) => Ok(account),
            None => self.refresh_account(player).await,
        }
    }

    /// Look the account up remotely even if cached, and cache the result
    pub async fn refresh_account(&self, player: &str) -> Result<Account, SyncError> {
        let riot_id = RiotId::parse(player)?;
        let account = self
            .request(|c| c.account_by_riot_id(&riot_id.game_name, &riot_id.tag_line))
            .await
            .map_err(|e| match e {
                RemoteError::NotFound(_) => RemoteError::NotFound(format!("account {}", player)),
                other => other,
            })?;

        self.accounts
            .lock()
            .insert(player.to_string(), account.clone());
        Ok(account)
    }

    /// All match ids of a player that started on or after `since` (UTC
    /// midnight), in source order. Each page is a separate paced request.
    pub async fn match_ids_since(
        &self,
        player: &str,
        since: NaiveDate,
        queue: Option<u32>,
    ) -> Result<Vec<String>, SyncError> {
        let account = self.account(player).await?;
        let start_time = since
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default();

        let mut ids = Vec::new();
        loop {
            let query = MatchIdsQuery {
                start_time,
                queue,
                start: ids.len() as u32,
                count: MATCH_IDS_PAGE_SIZE,
            };
            let page = self
                .request(|c| c.match_ids_page(&account.puuid, &query))
                .await?;
            let page_len = page.len();
            ids.extend(page);
            debug!(lane = self.index, player = %player, page_len, "match id page");
            if page_len < MATCH_IDS_PAGE_SIZE as usize {
                break;
            }
        }
        Ok(ids)
    }

    pub async fn match_detail(&self, match_id: &str) -> Result<Value, SyncError> {
        Ok(self.request(|c| c.match_detail(match_id)).await?)
    }

    /// Current solo-queue standing, dated `date`. `None` when the player has
    /// no ranked entry (a missing league record counts as empty).
    pub async fn ranking(
        &self,
        player: &str,
        date: &str,
    ) -> Result<Option<RankingSnapshot>, SyncError> {
        let account = self.account(player).await?;
        let entries: Vec<LeagueEntry> =
            match self.request(|c| c.league_entries(&account.puuid)).await {
                Ok(entries) => entries,
                Err(RemoteError::NotFound(_)) => Vec::new(),
                Err(e) => return Err(e.into()),
            };
        Ok(RankingSnapshot::from_entries(&account.puuid, date, &entries))
    }

    pub async fn match_timeline(&self, match_id: &str) -> Result<MatchTimeline, SyncError> {
        let raw: RawTimeline = self.request(|c| c.match_timeline(match_id)).await?;
        Ok(MatchTimeline::from_raw(match_id, raw))
    }
}
