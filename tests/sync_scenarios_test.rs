//! End-to-end sync scenarios against the simulated remote

use chrono::NaiveDate;
use riot_tap::protocol::{Emitter, SharedBuffer};
use riot_tap::remote::{SimulatedClientFactory, SimulatedRemote};
use riot_tap::{
    NoopPacer, SimulatedClock, State, StreamKind, SyncEngine, SyncReport, TapConfig,
    WatermarkStore,
};
use serde_json::Value;
use std::sync::Arc;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn ts(date: &str) -> i64 {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp()
}

async fn run(
    remote: Arc<SimulatedRemote>,
    config: TapConfig,
    streams: &[StreamKind],
    state: State,
) -> (SyncReport, Vec<Value>, Arc<WatermarkStore>) {
    let engine = SyncEngine::new(
        config,
        Arc::new(SimulatedClientFactory::new(remote)),
        Arc::new(NoopPacer::new()),
        Arc::new(SimulatedClock::new(today())),
    )
    .unwrap();
    let buffer = SharedBuffer::new();
    let watermarks = Arc::new(WatermarkStore::from_state(state));
    let report = engine
        .run(streams, watermarks.clone(), Emitter::new(Box::new(buffer.clone())))
        .await
        .unwrap();
    (report, buffer.messages(), watermarks)
}

fn config_with(players: &[&str]) -> TapConfig {
    let mut config = TapConfig::test();
    config.players = players.iter().map(|p| p.to_string()).collect();
    config
}

#[tokio::test]
async fn test_faker_three_matches() {
    let remote = Arc::new(SimulatedRemote::default());
    let puuid = remote.add_player("Faker", "KR1");
    for (id, date) in [("KR_1", "2024-02-01"), ("KR_2", "2024-03-01"), ("KR_3", "2024-04-01")] {
        remote.add_match(&puuid, id, ts(date), 420);
    }

    let (report, messages, _) =
        run(remote, config_with(&["Faker#KR1"]), &[StreamKind::Matches], State::default()).await;

    let kinds: Vec<&str> = messages.iter().map(|m| m["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["SCHEMA", "RECORD", "RECORD", "RECORD", "STATE"]);
    assert_eq!(messages[4]["value"]["matches"]["Faker#KR1"], "2024-06-01");
    assert_eq!(report.records_for(StreamKind::Matches), 3);
    assert!(report.verdict().is_ok());
}

#[tokio::test]
async fn test_no_hashtag_player_is_isolated() {
    let remote = Arc::new(SimulatedRemote::default());
    remote.add_player("Faker", "KR1");
    remote.add_player("Caps", "EUW");

    let mut config = config_with(&["NoHashtag", "Faker#KR1", "Caps#EUW"]);
    config.api_keys = vec!["a".to_string(), "b".to_string()];
    let (report, messages, _) =
        run(remote, config, &[StreamKind::Accounts], State::default()).await;

    assert_eq!(report.identities_failed, 1);
    assert_eq!(report.identities_completed, 2);
    let records: Vec<&Value> = messages.iter().filter(|m| m["type"] == "RECORD").collect();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["record"]["puuid"] != Value::Null));
}

#[tokio::test]
async fn test_state_round_trip_resumes_where_it_stopped() {
    let remote = Arc::new(SimulatedRemote::default());
    let puuid = remote.add_player("Faker", "KR1");
    remote.add_match(&puuid, "KR_OLD", ts("2024-05-30"), 420);
    remote.add_match(&puuid, "KR_TODAY", ts("2024-06-01"), 420);

    let config = config_with(&["Faker#KR1"]);
    let streams = [StreamKind::Matches, StreamKind::Elos];
    let (_, first, _) = run(remote.clone(), config.clone(), &streams, State::default()).await;
    let first_matches = first
        .iter()
        .filter(|m| m["type"] == "RECORD" && m["stream"] == "matches")
        .count();
    assert_eq!(first_matches, 2);

    // Feed the last STATE line back in as-is
    let last_state = first.iter().rev().find(|m| m["type"] == "STATE").unwrap();
    let state = State::from_json(&last_state.to_string()).unwrap();
    assert_eq!(state.value["elos"]["Faker#KR1"], "2024-06-01");

    let (report, second, watermarks) = run(remote, config, &streams, state).await;
    let matches: Vec<&Value> = second
        .iter()
        .filter(|m| m["type"] == "RECORD" && m["stream"] == "matches")
        .collect();
    assert_eq!(matches.len(), 1, "only matches from today onward are listed again");
    assert_eq!(matches[0]["record"]["matchId"], "KR_TODAY");
    assert_eq!(report.records_for(StreamKind::Elos), 0, "ranking already synced today");
    assert_eq!(watermarks.get("matches", "Faker#KR1").as_deref(), Some("2024-06-01"));
}

#[tokio::test]
async fn test_streams_run_in_selection_order() {
    let remote = Arc::new(SimulatedRemote::default());
    remote.add_player("Faker", "KR1");

    let (_, messages, _) = run(
        remote,
        config_with(&["Faker#KR1"]),
        &[StreamKind::Accounts, StreamKind::Matches],
        State::default(),
    )
    .await;

    let schemas: Vec<&str> = messages
        .iter()
        .filter(|m| m["type"] == "SCHEMA")
        .map(|m| m["stream"].as_str().unwrap())
        .collect();
    assert_eq!(schemas, vec!["accounts", "matches"]);
}

#[tokio::test]
async fn test_queue_filter_is_forwarded() {
    let remote = Arc::new(SimulatedRemote::default());
    let puuid = remote.add_player("Faker", "KR1");
    remote.add_match(&puuid, "SOLO", ts("2024-03-01"), 420);
    remote.add_match(&puuid, "FLEX", ts("2024-03-02"), 440);

    let mut config = config_with(&["Faker#KR1"]);
    config.queue_id = Some(420);
    let (report, messages, _) =
        run(remote, config, &[StreamKind::Matches], State::default()).await;

    assert_eq!(report.records_for(StreamKind::Matches), 1);
    let record = messages.iter().find(|m| m["type"] == "RECORD").unwrap();
    assert_eq!(record["record"]["matchId"], "SOLO");
}
