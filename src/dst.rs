//! Deterministic Simulation Testing for the sync engine
//!
//! Each seed generates a world (players, matches, league entries, prior
//! watermarks) on a `SimulatedRemote` with per-key fault injection, then syncs
//! it twice: once across N credential lanes and once through a single lane.
//! Faults are a pure function of (seed, operation, key), so both runs see
//! identical remote responses and must export the same records.
//!
//! ```text
//! for seed in 0..100 {
//!     let world = World::generate(seed);
//!     let wide = sync(world, N lanes);
//!     let narrow = sync(world, 1 lane);
//!     check(wide); check(narrow);
//!     assert_eq!(records(wide), records(narrow));
//! }
//! ```
//!
//! Invariants checked per run:
//! - shards partition the player set and follow `shard_index`
//! - one SCHEMA per stream, before any of its RECORDs
//! - exported matches start on or after the player's watermark date and
//!   match the queue filter
//! - STATE snapshots grow monotonically; a watermark only ever moves to today
//! - no RECORD of a player follows the STATE that completed that player
//! - a player whose ranking watermark is already today gets no ranking record

use crate::clock::SimulatedClock;
use crate::config::{TapConfig, DATE_FORMAT};
use crate::pacing::NoopPacer;
use crate::protocol::{Emitter, SharedBuffer};
use crate::records::LeagueEntry;
use crate::remote::{SimulatedClientFactory, SimulatedRemote, SimulatedRemoteConfig};
use crate::sharding::{partition, shard_index};
use crate::state::{State, WatermarkStore};
use crate::streams::StreamKind;
use crate::sync::{SyncEngine, SyncReport};
use chrono::{Days, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

const TAGS: [&str; 4] = ["EUW", "KR1", "NA1", "OCE"];
const QUEUES: [u32; 2] = [420, 440];

/// Configuration for sync DST
#[derive(Debug, Clone)]
pub struct SyncDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Remote fault configuration
    pub remote: SimulatedRemoteConfig,
    /// Credential lanes of the wide run
    pub lanes: usize,
    pub players: usize,
    pub max_matches_per_player: usize,
    /// Probability a player string has no `#`
    pub invalid_player_prob: f64,
    /// Probability a well-formed player does not exist remotely
    pub unknown_player_prob: f64,
    pub ranked_prob: f64,
    /// Probability of a prior watermark per (stream, player)
    pub prior_state_prob: f64,
    pub queue_id: Option<u32>,
}

impl Default for SyncDSTConfig {
    fn default() -> Self {
        SyncDSTConfig {
            seed: 0,
            remote: SimulatedRemoteConfig::default(),
            lanes: 3,
            players: 12,
            max_matches_per_player: 30,
            invalid_player_prob: 0.05,
            unknown_player_prob: 0.05,
            ranked_prob: 0.7,
            prior_state_prob: 0.4,
            queue_id: None,
        }
    }
}

impl SyncDSTConfig {
    pub fn new(seed: u64) -> Self {
        SyncDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Calm mode - no injected faults, no malformed players
    pub fn calm(seed: u64) -> Self {
        SyncDSTConfig {
            seed,
            remote: SimulatedRemoteConfig::no_faults(),
            invalid_player_prob: 0.0,
            unknown_player_prob: 0.0,
            ..Default::default()
        }
    }

    /// Moderate fault injection
    pub fn moderate(seed: u64) -> Self {
        SyncDSTConfig {
            seed,
            remote: SimulatedRemoteConfig::default(),
            ..Default::default()
        }
    }

    /// Chaos mode - aggressive faults, more lanes, long match histories
    pub fn chaos(seed: u64) -> Self {
        SyncDSTConfig {
            seed,
            remote: SimulatedRemoteConfig::high_chaos(),
            lanes: 5,
            players: 20,
            max_matches_per_player: 130,
            invalid_player_prob: 0.1,
            unknown_player_prob: 0.1,
            queue_id: Some(420),
            ..Default::default()
        }
    }
}

/// Ground truth about one generated match
#[derive(Debug, Clone)]
struct MatchFacts {
    player: String,
    start_time: i64,
    queue: u32,
}

/// Generated world shared by both runs of a seed
struct World {
    remote: Arc<SimulatedRemote>,
    players: Vec<String>,
    matches: HashMap<String, MatchFacts>,
    prior: State,
    start_date: NaiveDate,
    today: NaiveDate,
}

impl World {
    fn generate(config: &SyncDSTConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let remote = Arc::new(SimulatedRemote::new(
            config.remote.clone().with_seed(config.seed),
        ));
        let start_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or(NaiveDate::MIN);
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap_or(NaiveDate::MIN);
        let horizon_days = (today - start_date).num_days().max(1) as u64;
        let window_start = midnight(start_date) - 30 * 86_400;
        let window_end = midnight(today);

        let mut players = Vec::with_capacity(config.players);
        let mut matches = HashMap::new();
        let mut prior = State::default();

        for i in 0..config.players {
            let name = format!("Player{}", i);
            let tag = TAGS[rng.gen_range(0..TAGS.len())];
            if rng.gen_bool(config.invalid_player_prob) {
                players.push(name);
                continue;
            }
            let player = format!("{}#{}", name, tag);
            if rng.gen_bool(config.unknown_player_prob) {
                players.push(player);
                continue;
            }

            let puuid = remote.add_player(&name, tag);
            let match_count = rng.gen_range(0..=config.max_matches_per_player);
            for j in 0..match_count {
                let id = format!("DST{}_{}_{}", config.seed, i, j);
                let start_time = rng.gen_range(window_start..window_end);
                let queue = QUEUES[rng.gen_range(0..QUEUES.len())];
                remote.add_match(&puuid, &id, start_time, queue);
                matches.insert(
                    id,
                    MatchFacts {
                        player: player.clone(),
                        start_time,
                        queue,
                    },
                );
            }

            if rng.gen_bool(config.ranked_prob) {
                remote.set_league_entries(
                    &puuid,
                    vec![LeagueEntry {
                        queue_type: "RANKED_SOLO_5x5".to_string(),
                        tier: "GOLD".to_string(),
                        rank: "II".to_string(),
                        league_points: rng.gen_range(0..100),
                        wins: rng.gen_range(0..500),
                        losses: rng.gen_range(0..500),
                    }],
                );
            }

            for stream in [StreamKind::Matches, StreamKind::MatchTimelines, StreamKind::Elos] {
                if rng.gen_bool(config.prior_state_prob) {
                    let offset = rng.gen_range(0..=horizon_days);
                    let date = start_date
                        .checked_add_days(Days::new(offset))
                        .unwrap_or(today);
                    prior
                        .value
                        .entry(stream.name().to_string())
                        .or_default()
                        .insert(player.clone(), date.format(DATE_FORMAT).to_string());
                }
            }
            players.push(player);
        }

        World {
            remote,
            players,
            matches,
            prior,
            start_date,
            today,
        }
    }

    fn watermark(&self, stream: StreamKind, player: &str) -> NaiveDate {
        self.prior
            .value
            .get(stream.name())
            .and_then(|players| players.get(player))
            .and_then(|d| NaiveDate::parse_from_str(d, DATE_FORMAT).ok())
            .unwrap_or(self.start_date)
    }
}

fn midnight(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Output of one sync run
struct RunOutput {
    report: SyncReport,
    messages: Vec<Value>,
}

/// Result of a DST run
#[derive(Debug, Clone)]
pub struct SyncDSTResult {
    pub seed: u64,
    pub passed: bool,
    pub error_message: Option<String>,
    pub players: usize,
    pub records: u64,
    pub states: u64,
    pub identities_failed: u64,
    pub items_skipped: u64,
}

impl SyncDSTResult {
    fn new(seed: u64) -> Self {
        SyncDSTResult {
            seed,
            passed: true,
            error_message: None,
            players: 0,
            records: 0,
            states: 0,
            identities_failed: 0,
            items_skipped: 0,
        }
    }

    fn fail(&mut self, message: String) {
        if self.passed {
            self.passed = false;
            self.error_message = Some(message);
        }
    }
}

async fn sync_world(
    world: &World,
    config: &SyncDSTConfig,
    lanes: usize,
) -> Result<RunOutput, String> {
    let mut tap = TapConfig::test();
    tap.api_keys = (0..lanes).map(|i| format!("dst-key-{}", i)).collect();
    tap.players = world.players.clone();
    tap.start_date = world.start_date.format(DATE_FORMAT).to_string();
    tap.queue_id = config.queue_id;

    let engine = SyncEngine::new(
        tap,
        Arc::new(SimulatedClientFactory::new(world.remote.clone())),
        Arc::new(NoopPacer::new()),
        Arc::new(SimulatedClock::new(world.today)),
    )
    .map_err(|e| e.to_string())?;

    let buffer = SharedBuffer::new();
    let report = engine
        .run(
            &StreamKind::ALL,
            Arc::new(WatermarkStore::from_state(world.prior.clone())),
            Emitter::new(Box::new(buffer.clone())),
        )
        .await
        .map_err(|e| e.to_string())?;

    Ok(RunOutput {
        report,
        messages: buffer.messages(),
    })
}

fn check_partition(world: &World, lanes: usize) -> Result<(), String> {
    let shards = partition(&world.players, lanes);
    let mut seen = HashSet::new();
    for (index, shard) in shards.iter().enumerate() {
        for player in shard {
            if shard_index(player, lanes) != index {
                return Err(format!("{} placed in shard {}", player, index));
            }
            if !seen.insert(player.clone()) {
                return Err(format!("{} placed twice", player));
            }
        }
    }
    if seen.len() != world.players.iter().collect::<HashSet<_>>().len() {
        return Err("shards do not cover every player".to_string());
    }
    Ok(())
}

fn record_player(world: &World, stream: &str, record: &Value) -> Option<String> {
    match stream {
        "matches" | "match_timelines" => record["matchId"]
            .as_str()
            .and_then(|id| world.matches.get(id))
            .map(|facts| facts.player.clone()),
        _ => {
            let puuid = record["puuid"].as_str()?;
            world.players.iter().find_map(|player| {
                let (name, tag) = player.split_once('#')?;
                (puuid == format!("puuid-{}-{}", name, tag)).then(|| player.clone())
            })
        }
    }
}

fn check_run(world: &World, config: &SyncDSTConfig, output: &RunOutput) -> Result<(), String> {
    let today = world.today.format(DATE_FORMAT).to_string();
    let mut schemas: HashSet<String> = HashSet::new();
    let mut completed: HashSet<(String, String)> = HashSet::new();
    let mut last_state: BTreeMap<String, BTreeMap<String, String>> = world.prior.value.clone();
    let mut last_size = 0usize;

    for (line, message) in output.messages.iter().enumerate() {
        match message["type"].as_str() {
            Some("SCHEMA") => {
                let stream = message["stream"].as_str().unwrap_or_default().to_string();
                if !schemas.insert(stream.clone()) {
                    return Err(format!("line {}: second SCHEMA for {}", line, stream));
                }
            }
            Some("RECORD") => {
                let stream = message["stream"].as_str().unwrap_or_default();
                if !schemas.contains(stream) {
                    return Err(format!("line {}: RECORD before SCHEMA for {}", line, stream));
                }
                let record = &message["record"];
                let player = record_player(world, stream, record)
                    .ok_or_else(|| format!("line {}: record of unknown player", line))?;
                if completed.contains(&(stream.to_string(), player.clone())) {
                    return Err(format!(
                        "line {}: {} record for {} after its checkpoint",
                        line, stream, player
                    ));
                }

                if let Some(kind) = stream.parse::<StreamKind>().ok().filter(|k| {
                    matches!(k, StreamKind::Matches | StreamKind::MatchTimelines)
                }) {
                    let id = record["matchId"].as_str().unwrap_or_default();
                    let facts = world
                        .matches
                        .get(id)
                        .ok_or_else(|| format!("line {}: unknown match {}", line, id))?;
                    let since = midnight(world.watermark(kind, &player));
                    if facts.start_time < since {
                        return Err(format!(
                            "line {}: {} started before watermark of {}",
                            line, id, player
                        ));
                    }
                    if config.queue_id.map_or(false, |q| q != facts.queue) {
                        return Err(format!("line {}: {} outside queue filter", line, id));
                    }
                }
                if stream == "elos" && world.watermark(StreamKind::Elos, &player) == world.today {
                    return Err(format!(
                        "line {}: ranking for {} already synced today",
                        line, player
                    ));
                }
            }
            Some("STATE") => {
                let value: BTreeMap<String, BTreeMap<String, String>> =
                    serde_json::from_value(message["value"].clone())
                        .map_err(|e| format!("line {}: bad STATE: {}", line, e))?;
                let size: usize = value.values().map(|m| m.len()).sum();
                if size < last_size {
                    return Err(format!("line {}: STATE shrank", line));
                }
                for (stream, players) in &value {
                    for (player, date) in players {
                        let before = last_state.get(stream).and_then(|m| m.get(player));
                        if before != Some(date) {
                            if *date != today {
                                return Err(format!(
                                    "line {}: {}/{} moved to {}",
                                    line, stream, player, date
                                ));
                            }
                            completed.insert((stream.clone(), player.clone()));
                        }
                    }
                }
                last_state = value;
                last_size = size;
            }
            other => return Err(format!("line {}: unexpected message {:?}", line, other)),
        }
    }

    if schemas.len() != StreamKind::ALL.len() {
        return Err(format!("expected 4 SCHEMA messages, saw {}", schemas.len()));
    }
    Ok(())
}

fn record_multiset(messages: &[Value]) -> Vec<String> {
    let mut records: Vec<String> = messages
        .iter()
        .filter(|m| m["type"] == "RECORD")
        .map(|m| m.to_string())
        .collect();
    records.sort();
    records
}

/// Run one seed: wide run, narrow run, invariants, equivalence
pub async fn run_sync_dst(config: SyncDSTConfig) -> SyncDSTResult {
    let mut result = SyncDSTResult::new(config.seed);
    let world = World::generate(&config);
    result.players = world.players.len();

    if let Err(e) = check_partition(&world, config.lanes.max(1)) {
        result.fail(format!("partition: {}", e));
        return result;
    }

    let wide = match sync_world(&world, &config, config.lanes.max(1)).await {
        Ok(output) => output,
        Err(e) => {
            result.fail(format!("wide run failed: {}", e));
            return result;
        }
    };
    let narrow = match sync_world(&world, &config, 1).await {
        Ok(output) => output,
        Err(e) => {
            result.fail(format!("single-lane run failed: {}", e));
            return result;
        }
    };

    result.records = wide.report.total_records();
    result.states = wide.report.states;
    result.identities_failed = wide.report.identities_failed;
    result.items_skipped = wide.report.items_skipped;

    if let Err(e) = check_run(&world, &config, &wide) {
        result.fail(format!("{} lanes: {}", config.lanes, e));
    }
    if let Err(e) = check_run(&world, &config, &narrow) {
        result.fail(format!("1 lane: {}", e));
    }
    if record_multiset(&wide.messages) != record_multiset(&narrow.messages) {
        result.fail(format!(
            "record sets differ: {} lanes exported {}, 1 lane exported {}",
            config.lanes,
            wide.report.total_records(),
            narrow.report.total_records()
        ));
    }
    if wide.report.records != narrow.report.records {
        result.fail("per-stream record counts differ".to_string());
    }
    if wide.report.identities_completed != narrow.report.identities_completed {
        result.fail("completed identity counts differ".to_string());
    }

    result
}

/// Run a batch of seeds
pub async fn run_sync_dst_batch(
    seeds: std::ops::Range<u64>,
    config_fn: impl Fn(u64) -> SyncDSTConfig,
) -> Vec<SyncDSTResult> {
    let mut results = Vec::with_capacity(seeds.end.saturating_sub(seeds.start) as usize);
    for seed in seeds {
        results.push(run_sync_dst(config_fn(seed)).await);
    }
    results
}

/// Summary of batch results
pub fn summarize_sync_dst_batch(results: &[SyncDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed_seeds: Vec<u64> = results.iter().filter(|r| !r.passed).map(|r| r.seed).collect();
    let records: u64 = results.iter().map(|r| r.records).sum();
    let failed_identities: u64 = results.iter().map(|r| r.identities_failed).sum();
    let skipped: u64 = results.iter().map(|r| r.items_skipped).sum();

    let mut summary = format!(
        "Sync DST: {}/{} passed, {} records, {} failed identities, {} skipped items",
        passed, total, records, failed_identities, skipped
    );
    if !failed_seeds.is_empty() {
        summary.push_str(&format!("\nFailed seeds: {:?}", failed_seeds));
    }
    summary
}
