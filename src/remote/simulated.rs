//! Simulated Remote with Fault Injection
//!
//! In-memory stand-in for the Riot API. Holds a small world of accounts,
//! matches, timelines and league entries, records every call, and injects
//! transport failures.
//!
//! Fault decisions are a pure function of (seed, operation, key): the same
//! request fails the same way no matter which lane issues it or in what
//! order. That keeps responses identical between a run with N concurrent lanes
//! and a run with one lane, which the DST harness relies on.

use crate::records::{Account, LeagueEntry, RawFrame, RawParticipant, RawTimeline, RawTimelineInfo};
use crate::remote::{ClientFactory, MatchIdsQuery, RemoteDataClient, RemoteError, RemoteFuture};
use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Configuration for simulated fault injection
#[derive(Debug, Clone)]
pub struct SimulatedRemoteConfig {
    /// Seed mixed into every fault decision
    pub seed: u64,
    pub account_fail_prob: f64,
    pub list_fail_prob: f64,
    pub detail_fail_prob: f64,
    pub league_fail_prob: f64,
    pub timeline_fail_prob: f64,
}

impl Default for SimulatedRemoteConfig {
    fn default() -> Self {
        SimulatedRemoteConfig {
            seed: 0,
            account_fail_prob: 0.02,  // 2%
            list_fail_prob: 0.02,     // 2%
            detail_fail_prob: 0.05,   // 5%
            league_fail_prob: 0.02,   // 2%
            timeline_fail_prob: 0.05, // 5%
        }
    }
}

impl SimulatedRemoteConfig {
    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedRemoteConfig {
            seed: 0,
            account_fail_prob: 0.0,
            list_fail_prob: 0.0,
            detail_fail_prob: 0.0,
            league_fail_prob: 0.0,
            timeline_fail_prob: 0.0,
        }
    }

    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedRemoteConfig {
            seed: 0,
            account_fail_prob: 0.1,
            list_fail_prob: 0.1,
            detail_fail_prob: 0.2,
            league_fail_prob: 0.1,
            timeline_fail_prob: 0.2,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// A request observed by the simulated remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Account { game_name: String, tag_line: String },
    MatchIdsPage { puuid: String, query: MatchIdsQuery },
    MatchDetail(String),
    LeagueEntries(String),
    MatchTimeline(String),
}

#[derive(Debug, Clone)]
struct SimMatch {
    id: String,
    start_time: i64,
    queue: u32,
}

#[derive(Debug, Default)]
struct World {
    accounts: HashMap<(String, String), Account>,
    matches: HashMap<String, Vec<SimMatch>>,
    details: HashMap<String, Value>,
    timelines: HashMap<String, RawTimeline>,
    leagues: HashMap<String, Vec<LeagueEntry>>,
    /// Keys that always fail with a transport error
    broken: HashSet<String>,
}

/// In-memory remote source
#[derive(Debug)]
pub struct SimulatedRemote {
    config: SimulatedRemoteConfig,
    world: RwLock<World>,
    calls: Mutex<Vec<RemoteCall>>,
}

impl Default for SimulatedRemote {
    fn default() -> Self {
        Self::new(SimulatedRemoteConfig::no_faults())
    }
}

impl SimulatedRemote {
    pub fn new(config: SimulatedRemoteConfig) -> Self {
        SimulatedRemote {
            config,
            world: RwLock::new(World::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Register a player; returns its puuid
    pub fn add_player(&self, game_name: &str, tag_line: &str) -> String {
        let puuid = format!("puuid-{}-{}", game_name, tag_line);
        self.world.write().accounts.insert(
            (game_name.to_string(), tag_line.to_string()),
            Account {
                puuid: puuid.clone(),
                game_name: game_name.to_string(),
                tag_line: tag_line.to_string(),
            },
        );
        puuid
    }

    /// Register a match played by `puuid`, with a generated detail and timeline.
    /// A match shared by several players is stored once.
    pub fn add_match(&self, puuid: &str, match_id: &str, start_time: i64, queue: u32) {
        let mut world = self.world.write();
        world
            .matches
            .entry(puuid.to_string())
            .or_default()
            .push(SimMatch {
                id: match_id.to_string(),
                start_time,
                queue,
            });

        world.details.entry(match_id.to_string()).or_insert_with(|| {
            json!({
                "metadata": {"matchId": match_id, "participants": [puuid]},
                "info": {"gameStartTimestamp": start_time * 1000, "queueId": queue}
            })
        });
        world
            .timelines
            .entry(match_id.to_string())
            .or_insert_with(|| generated_timeline(puuid, start_time));
    }

    pub fn set_league_entries(&self, puuid: &str, entries: Vec<LeagueEntry>) {
        self.world.write().leagues.insert(puuid.to_string(), entries);
    }

    /// Make every request about `key` (match id, puuid or `name#tag`) fail
    pub fn break_key(&self, key: &str) {
        self.world.write().broken.insert(key.to_string());
    }

    /// All calls so far, in arrival order
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().push(call);
    }

    fn fault(&self, op: &str, key: &str, prob: f64) -> Result<(), RemoteError> {
        if self.world.read().broken.contains(key) {
            return Err(RemoteError::Transport(format!("{} {}: connection reset", op, key)));
        }
        if prob <= 0.0 {
            return Ok(());
        }
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(op.as_bytes());
        hasher.update(key.as_bytes());
        let mut rng =
            ChaCha8Rng::seed_from_u64(self.config.seed ^ (u64::from(hasher.finalize()) << 20));
        if rng.gen_bool(prob.min(1.0)) {
            Err(RemoteError::Transport(format!("{} {}: injected fault", op, key)))
        } else {
            Ok(())
        }
    }
}

fn generated_timeline(puuid: &str, start_time: i64) -> RawTimeline {
    let frames = (0..3)
        .map(|i| RawFrame {
            timestamp: i * 60_000,
            participant_frames: [(
                "1".to_string(),
                json!({"currentGold": 500 + i * 100, "level": 1 + i, "totalGold": 500 + i * 300}),
            )]
            .into_iter()
            .collect(),
            events: vec![json!({"type": "LEVEL_UP", "timestamp": start_time + i})],
        })
        .collect();

    RawTimeline {
        info: RawTimelineInfo {
            participants: vec![RawParticipant {
                participant_id: 1,
                puuid: puuid.to_string(),
            }],
            frames,
        },
    }
}

impl RemoteDataClient for SimulatedRemote {
    fn account_by_riot_id<'a>(
        &'a self,
        game_name: &'a str,
        tag_line: &'a str,
    ) -> RemoteFuture<'a, Account> {
        Box::pin(async move {
            self.record(RemoteCall::Account {
                game_name: game_name.to_string(),
                tag_line: tag_line.to_string(),
            });
            let riot_id = format!("{}#{}", game_name, tag_line);
            self.fault("account", &riot_id, self.config.account_fail_prob)?;
            self.world
                .read()
                .accounts
                .get(&(game_name.to_string(), tag_line.to_string()))
                .cloned()
                .ok_or(RemoteError::NotFound(riot_id))
        })
    }

    fn match_ids_page<'a>(
        &'a self,
        puuid: &'a str,
        query: &'a MatchIdsQuery,
    ) -> RemoteFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.record(RemoteCall::MatchIdsPage {
                puuid: puuid.to_string(),
                query: query.clone(),
            });
            self.fault("match_ids", puuid, self.config.list_fail_prob)?;

            let world = self.world.read();
            let mut matches: Vec<&SimMatch> = world
                .matches
                .get(puuid)
                .map(|m| m.iter().collect())
                .unwrap_or_default();
            matches.retain(|m| {
                m.start_time >= query.start_time && query.queue.map_or(true, |q| q == m.queue)
            });
            // Most recent first, ties broken by id for a stable order
            matches.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(a.id.cmp(&b.id)));

            Ok(matches
                .into_iter()
                .skip(query.start as usize)
                .take(query.count as usize)
                .map(|m| m.id.clone())
                .collect())
        })
    }

    fn match_detail<'a>(&'a self, match_id: &'a str) -> RemoteFuture<'a, Value> {
        Box::pin(async move {
            self.record(RemoteCall::MatchDetail(match_id.to_string()));
            self.fault("match_detail", match_id, self.config.detail_fail_prob)?;
            self.world
                .read()
                .details
                .get(match_id)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(match_id.to_string()))
        })
    }

    fn league_entries<'a>(&'a self, puuid: &'a str) -> RemoteFuture<'a, Vec<LeagueEntry>> {
        Box::pin(async move {
            self.record(RemoteCall::LeagueEntries(puuid.to_string()));
            self.fault("league", puuid, self.config.league_fail_prob)?;
            Ok(self.world.read().leagues.get(puuid).cloned().unwrap_or_default())
        })
    }

    fn match_timeline<'a>(&'a self, match_id: &'a str) -> RemoteFuture<'a, RawTimeline> {
        Box::pin(async move {
            self.record(RemoteCall::MatchTimeline(match_id.to_string()));
            self.fault("timeline", match_id, self.config.timeline_fail_prob)?;
            self.world
                .read()
                .timelines
                .get(match_id)
                .cloned()
                .ok_or_else(|| RemoteError::NotFound(match_id.to_string()))
        })
    }
}

/// Hands the same simulated remote to every credential
#[derive(Debug, Clone)]
pub struct SimulatedClientFactory {
    remote: Arc<SimulatedRemote>,
    rejected_keys: HashSet<String>,
}

impl SimulatedClientFactory {
    pub fn new(remote: Arc<SimulatedRemote>) -> Self {
        SimulatedClientFactory {
            remote,
            rejected_keys: HashSet::new(),
        }
    }

    /// Make `connect` fail for this key
    pub fn reject_key(mut self, api_key: &str) -> Self {
        self.rejected_keys.insert(api_key.to_string());
        self
    }
}

impl ClientFactory for SimulatedClientFactory {
    fn connect(&self, api_key: &str) -> Result<Arc<dyn RemoteDataClient>, RemoteError> {
        if self.rejected_keys.contains(api_key) {
            return Err(RemoteError::Transport(format!(
                "client for key {} unavailable",
                api_key
            )));
        }
        let client: Arc<dyn RemoteDataClient> = self.remote.clone();
        Ok(client)
    }
}
