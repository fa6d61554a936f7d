//! Stream pipelines
//!
//! A worker walks its shard one player at a time. Each player runs the
//! pipeline of the current stream to completion, including the checkpoint
//! acknowledgement from the export actor, before the next player starts.
//!
//! | stream            | reads watermark | remote calls                        | advances to |
//! |-------------------|-----------------|-------------------------------------|-------------|
//! | `accounts`        | no              | account                             | (unchanged) |
//! | `elos`            | yes             | account, league entries             | today       |
//! | `matches`         | yes             | account, id pages, detail per id    | today       |
//! | `match_timelines` | yes             | account, id pages, timeline per id  | today       |

use super::SyncContext;
use crate::config::DATE_FORMAT;
use crate::error::SyncError;
use crate::lane::CredentialLane;
use crate::records::MatchRecord;
use crate::streams::StreamKind;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress is logged every this many items
const PROGRESS_EVERY: usize = 50;

/// Outcome of one worker over its shard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub identities_completed: u64,
    pub identities_failed: u64,
    pub items_skipped: u64,
}

/// Sync every player of `shard` for `stream`, sequentially, through `lane`
pub async fn run_worker(
    ctx: Arc<SyncContext>,
    stream: StreamKind,
    lane: Arc<CredentialLane>,
    shard: Vec<String>,
) -> WorkerReport {
    let mut report = WorkerReport::default();
    let total = shard.len();

    for (position, player) in shard.iter().enumerate() {
        info!(
            stream = %stream,
            lane = lane.index(),
            "Group {}: Starting player {}/{}",
            lane.index(),
            position + 1,
            total
        );

        match sync_player(&ctx, stream, &lane, player).await {
            Ok(skipped) => {
                report.identities_completed += 1;
                report.items_skipped += skipped;
            }
            Err(e) => {
                warn!(
                    stream = %stream,
                    player = %player,
                    lane = lane.index(),
                    transient = e.is_transient(),
                    "Failed to sync player: {}",
                    e
                );
                report.identities_failed += 1;
            }
        }
    }

    debug!(stream = %stream, lane = lane.index(), ?report, "Worker done");
    report
}

/// Returns the number of items skipped after a failed fetch
async fn sync_player(
    ctx: &SyncContext,
    stream: StreamKind,
    lane: &CredentialLane,
    player: &str,
) -> Result<u64, SyncError> {
    match stream {
        StreamKind::Accounts => sync_account(ctx, lane, player).await.map(|_| 0),
        StreamKind::Elos => sync_ranking(ctx, lane, player).await.map(|_| 0),
        StreamKind::Matches | StreamKind::MatchTimelines => {
            sync_matches(ctx, stream, lane, player).await
        }
    }
}

/// Last synced date of `player`, or the configured start date
fn resolve_watermark(
    ctx: &SyncContext,
    stream: StreamKind,
    player: &str,
) -> Result<NaiveDate, SyncError> {
    match ctx.watermarks.get(stream.name(), player) {
        Some(value) => NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|_| {
            SyncError::InvalidWatermark {
                player: player.to_string(),
                value,
            }
        }),
        None => Ok(ctx.start_date),
    }
}

fn today(ctx: &SyncContext) -> String {
    ctx.clock.today().format(DATE_FORMAT).to_string()
}

async fn sync_account(
    ctx: &SyncContext,
    lane: &CredentialLane,
    player: &str,
) -> Result<(), SyncError> {
    let account = lane.refresh_account(player).await?;
    ctx.export.record(StreamKind::Accounts, &account)?;
    ctx.export
        .complete(StreamKind::Accounts, player, None)
        .await?;
    Ok(())
}

async fn sync_ranking(
    ctx: &SyncContext,
    lane: &CredentialLane,
    player: &str,
) -> Result<(), SyncError> {
    let stream = StreamKind::Elos;
    let watermark = resolve_watermark(ctx, stream, player)?;
    if ctx.clock.is_today(watermark) {
        info!(stream = %stream, player = %player, "Ranking already synced today, skipping");
        return Ok(());
    }

    let date = today(ctx);
    match lane.ranking(player, &date).await? {
        Some(snapshot) => ctx.export.record(stream, &snapshot)?,
        None => info!(stream = %stream, player = %player, "No solo queue ranking"),
    }
    ctx.export.complete(stream, player, Some(date)).await?;
    Ok(())
}

/// `matches` and `match_timelines`: list ids since the watermark, fetch each
async fn sync_matches(
    ctx: &SyncContext,
    stream: StreamKind,
    lane: &CredentialLane,
    player: &str,
) -> Result<u64, SyncError> {
    let since = resolve_watermark(ctx, stream, player)?;
    let ids = lane.match_ids_since(player, since, ctx.queue_id).await?;
    info!(
        stream = %stream,
        player = %player,
        lane = lane.index(),
        since = %since,
        "Found {} matches",
        ids.len()
    );

    let mut skipped = 0;
    for (position, match_id) in ids.iter().enumerate() {
        let exported = match stream {
            StreamKind::MatchTimelines => {
                let fetched = lane.match_timeline(match_id).await;
                export_item(ctx, stream, match_id, fetched)?
            }
            _ => {
                let fetched = lane
                    .match_detail(match_id)
                    .await
                    .map(|detail| MatchRecord::from_detail(match_id, detail));
                export_item(ctx, stream, match_id, fetched)?
            }
        };
        if !exported {
            skipped += 1;
        }

        if (position + 1) % PROGRESS_EVERY == 0 {
            info!(
                stream = %stream,
                player = %player,
                "Processed {}/{} matches",
                position + 1,
                ids.len()
            );
        }
    }

    ctx.export.complete(stream, player, Some(today(ctx))).await?;
    Ok(skipped)
}

/// Emit a fetched item. A failed fetch is logged and skipped; only a dead
/// export actor is an error.
fn export_item<T: Serialize>(
    ctx: &SyncContext,
    stream: StreamKind,
    match_id: &str,
    fetched: Result<T, SyncError>,
) -> Result<bool, SyncError> {
    match fetched {
        Ok(item) => {
            ctx.export.record(stream, &item)?;
            Ok(true)
        }
        Err(e) => {
            warn!(stream = %stream, match_id = %match_id, "Skipping match: {}", e);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::pacing::NoopPacer;
    use crate::protocol::{spawn_exporter, Emitter, SharedBuffer};
    use crate::records::LeagueEntry;
    use crate::remote::simulated::RemoteCall;
    use crate::remote::SimulatedRemote;
    use crate::state::WatermarkStore;
    use serde_json::Value;

    struct Harness {
        remote: Arc<SimulatedRemote>,
        buffer: SharedBuffer,
        ctx: Arc<SyncContext>,
        lane: Arc<CredentialLane>,
    }

    fn harness(watermarks: WatermarkStore) -> Harness {
        let remote = Arc::new(SimulatedRemote::default());
        let buffer = SharedBuffer::new();
        let watermarks = Arc::new(watermarks);
        let emitter = Emitter::new(Box::new(buffer.clone()));
        let (export, _task) = spawn_exporter(emitter, watermarks.clone());
        let clock = SimulatedClock::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let ctx = Arc::new(SyncContext {
            watermarks,
            export,
            clock: Arc::new(clock),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            queue_id: None,
        });
        let lane = CredentialLane::new(0, remote.clone(), Arc::new(NoopPacer::new()));
        Harness {
            remote,
            buffer,
            ctx,
            lane: Arc::new(lane),
        }
    }

    impl Harness {
        /// Run one worker over `players`, then drain the exporter
        async fn sync(&self, stream: StreamKind, players: &[&str]) -> WorkerReport {
            let shard = players.iter().map(|p| p.to_string()).collect();
            let report = run_worker(self.ctx.clone(), stream, self.lane.clone(), shard).await;
            self.ctx.export.shutdown().await;
            report
        }
    }

    fn ts(y: i32, m: u32, d: u32) -> i64 {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp()
    }

    fn of_type<'a>(messages: &'a [Value], kind: &str) -> Vec<&'a Value> {
        messages.iter().filter(|m| m["type"] == kind).collect()
    }

    #[tokio::test]
    async fn test_three_matches_then_state_with_today() {
        let h = harness(WatermarkStore::new());
        let puuid = h.remote.add_player("Faker", "KR1");
        for (i, id) in ["KR_1", "KR_2", "KR_3"].iter().enumerate() {
            h.remote.add_match(&puuid, id, ts(2024, 3, 1) + i as i64, 420);
        }

        let report = h.sync(StreamKind::Matches, &["Faker#KR1"]).await;

        assert_eq!(report.identities_completed, 1);
        let messages = h.buffer.messages();
        assert_eq!(messages.len(), 4);
        assert!(messages[..3]
            .iter()
            .all(|m| m["type"] == "RECORD" && m["stream"] == "matches"));
        assert_eq!(messages[0]["record"]["matchId"], "KR_3");
        assert_eq!(messages[3]["value"]["matches"]["Faker#KR1"], "2024-06-01");
    }

    #[tokio::test]
    async fn test_matches_with_no_results_still_advance() {
        let h = harness(WatermarkStore::new());
        h.remote.add_player("Quiet", "EUW");

        h.sync(StreamKind::Matches, &["Quiet#EUW"]).await;

        let watermark = h.ctx.watermarks.get("matches", "Quiet#EUW");
        assert_eq!(watermark.as_deref(), Some("2024-06-01"));
        assert!(of_type(&h.buffer.messages(), "RECORD").is_empty());
    }

    #[tokio::test]
    async fn test_matches_start_from_watermark() {
        let store = WatermarkStore::new();
        store.set("matches", "Faker#KR1", "2024-05-01");
        let h = harness(store);
        let puuid = h.remote.add_player("Faker", "KR1");
        h.remote.add_match(&puuid, "OLD", ts(2024, 4, 30), 420);
        h.remote.add_match(&puuid, "NEW", ts(2024, 5, 1), 420);

        h.sync(StreamKind::Matches, &["Faker#KR1"]).await;

        let records = h.buffer.messages();
        let ids: Vec<&Value> = of_type(&records, "RECORD")
            .iter()
            .map(|m| &m["record"]["matchId"])
            .collect();
        assert_eq!(ids, vec!["NEW"]);
        let listed = h.remote.calls().into_iter().find_map(|c| match c {
            RemoteCall::MatchIdsPage { query, .. } => Some(query.start_time),
            _ => None,
        });
        assert_eq!(listed, Some(ts(2024, 5, 1)));
    }

    #[tokio::test]
    async fn test_failed_detail_is_skipped_and_watermark_advances() {
        let h = harness(WatermarkStore::new());
        let puuid = h.remote.add_player("Faker", "KR1");
        h.remote.add_match(&puuid, "KR_1", ts(2024, 3, 1), 420);
        h.remote.add_match(&puuid, "KR_2", ts(2024, 3, 2), 420);
        h.remote.break_key("KR_2");

        let report = h.sync(StreamKind::Matches, &["Faker#KR1"]).await;

        assert_eq!(report.items_skipped, 1);
        assert_eq!(report.identities_completed, 1);
        assert_eq!(of_type(&h.buffer.messages(), "RECORD").len(), 1);
        let watermark = h.ctx.watermarks.get("matches", "Faker#KR1");
        assert_eq!(watermark.as_deref(), Some("2024-06-01"));
    }

    #[tokio::test]
    async fn test_failed_listing_keeps_watermark() {
        let h = harness(WatermarkStore::new());
        let puuid = h.remote.add_player("Faker", "KR1");
        h.remote.break_key(&puuid);

        let report = h.sync(StreamKind::Matches, &["Faker#KR1"]).await;

        assert_eq!(report.identities_failed, 1);
        assert_eq!(h.ctx.watermarks.get("matches", "Faker#KR1"), None);
        assert!(h.buffer.messages().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_identity_does_not_stop_siblings() {
        let h = harness(WatermarkStore::new());
        h.remote.add_player("Faker", "KR1");

        let report = h.sync(StreamKind::Accounts, &["NoHashtag", "Faker#KR1"]).await;

        assert_eq!(report.identities_failed, 1);
        assert_eq!(report.identities_completed, 1);
        let messages = h.buffer.messages();
        let records = of_type(&messages, "RECORD");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["record"]["gameName"], "Faker");
        assert_eq!(of_type(&messages, "STATE").len(), 1);
    }

    #[tokio::test]
    async fn test_accounts_refetch_even_when_cached() {
        let h = harness(WatermarkStore::new());
        h.remote.add_player("Faker", "KR1");
        h.lane.account("Faker#KR1").await.unwrap();
        assert_eq!(h.remote.call_count(), 1);

        let report = h.sync(StreamKind::Accounts, &["Faker#KR1"]).await;

        assert_eq!(report.identities_completed, 1);
        let accounts = h
            .remote
            .calls()
            .into_iter()
            .filter(|c| matches!(c, RemoteCall::Account { .. }))
            .count();
        assert_eq!(accounts, 2, "accounts stream issues its own lookup");
        assert_eq!(of_type(&h.buffer.messages(), "RECORD").len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_watermark_skips_player() {
        let store = WatermarkStore::new();
        store.set("elos", "Faker#KR1", "yesterday");
        let h = harness(store);
        h.remote.add_player("Faker", "KR1");

        let report = h.sync(StreamKind::Elos, &["Faker#KR1"]).await;

        assert_eq!(report.identities_failed, 1);
        assert_eq!(h.remote.call_count(), 0);
        let watermark = h.ctx.watermarks.get("elos", "Faker#KR1");
        assert_eq!(watermark.as_deref(), Some("yesterday"));
    }

    #[tokio::test]
    async fn test_ranking_skipped_when_synced_today() {
        let store = WatermarkStore::new();
        store.set("elos", "Faker#KR1", "2024-06-01");
        let h = harness(store);
        h.remote.add_player("Faker", "KR1");

        let report = h.sync(StreamKind::Elos, &["Faker#KR1"]).await;

        assert_eq!(report.identities_completed, 1);
        assert_eq!(h.remote.call_count(), 0);
        assert!(h.buffer.messages().is_empty());
    }

    #[tokio::test]
    async fn test_ranking_snapshot_dated_today() {
        let store = WatermarkStore::new();
        store.set("elos", "Faker#KR1", "2024-05-31");
        let h = harness(store);
        let puuid = h.remote.add_player("Faker", "KR1");
        h.remote.set_league_entries(
            &puuid,
            vec![
                LeagueEntry {
                    queue_type: "RANKED_FLEX_SR".to_string(),
                    tier: "GOLD".to_string(),
                    rank: "I".to_string(),
                    league_points: 10,
                    wins: 1,
                    losses: 1,
                },
                LeagueEntry {
                    queue_type: "RANKED_SOLO_5x5".to_string(),
                    tier: "CHALLENGER".to_string(),
                    rank: "I".to_string(),
                    league_points: 1500,
                    wins: 300,
                    losses: 200,
                },
            ],
        );

        h.sync(StreamKind::Elos, &["Faker#KR1"]).await;

        let messages = h.buffer.messages();
        let records = of_type(&messages, "RECORD");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["record"]["date"], "2024-06-01");
        assert_eq!(records[0]["record"]["tier"], "CHALLENGER");
        assert_eq!(records[0]["record"]["leaguePoints"], 1500);
        let watermark = h.ctx.watermarks.get("elos", "Faker#KR1");
        assert_eq!(watermark.as_deref(), Some("2024-06-01"));
    }

    #[tokio::test]
    async fn test_unranked_player_advances_without_record() {
        let h = harness(WatermarkStore::new());
        h.remote.add_player("Newbie", "EUW");

        h.sync(StreamKind::Elos, &["Newbie#EUW"]).await;

        let messages = h.buffer.messages();
        assert!(of_type(&messages, "RECORD").is_empty());
        assert_eq!(of_type(&messages, "STATE").len(), 1);
        let watermark = h.ctx.watermarks.get("elos", "Newbie#EUW");
        assert_eq!(watermark.as_deref(), Some("2024-06-01"));
    }

    #[tokio::test]
    async fn test_timelines_are_flattened() {
        let h = harness(WatermarkStore::new());
        let puuid = h.remote.add_player("Faker", "KR1");
        h.remote.add_match(&puuid, "KR_1", ts(2024, 3, 1), 420);

        h.sync(StreamKind::MatchTimelines, &["Faker#KR1"]).await;

        let messages = h.buffer.messages();
        let records = of_type(&messages, "RECORD");
        assert_eq!(records.len(), 1);
        let record = &records[0]["record"];
        assert_eq!(record["matchId"], "KR_1");
        assert_eq!(record["frames"].as_array().map(Vec::len), Some(3));
        assert_eq!(record["frames"][1]["playerId"], puuid.as_str());
        assert_eq!(record["frames"][1]["timestamp"], 60_000.0);
        assert_eq!(record["events"].as_array().map(Vec::len), Some(3));
        let watermark = h.ctx.watermarks.get("match_timelines", "Faker#KR1");
        assert_eq!(watermark.as_deref(), Some("2024-06-01"));
    }
}
