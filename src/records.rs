//! Record shapes emitted by the four streams, plus the raw API payloads the
//! records are derived from.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Queue whose league entry becomes the ranking snapshot
pub const RANKED_SOLO_QUEUE: &str = "RANKED_SOLO_5x5";

/// Riot account (accounts stream, key `puuid`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub puuid: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub tag_line: String,
}

/// One league-v4 entry as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueEntry {
    pub queue_type: String,
    #[serde(default)]
    pub tier: String,
    #[serde(default)]
    pub rank: String,
    #[serde(default)]
    pub league_points: i32,
    #[serde(default)]
    pub wins: i32,
    #[serde(default)]
    pub losses: i32,
}

/// Daily ranked standing of a player (elos stream, key `puuid` + `date`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingSnapshot {
    pub puuid: String,
    pub date: String,
    pub league_points: i32,
    pub tier: String,
    pub rank: String,
    pub wins: i32,
    pub losses: i32,
    pub queue_type: String,
}

impl RankingSnapshot {
    /// Snapshot of the solo-queue entry, if the player has one
    pub fn from_entries(puuid: &str, date: &str, entries: &[LeagueEntry]) -> Option<Self> {
        entries
            .iter()
            .find(|e| e.queue_type == RANKED_SOLO_QUEUE)
            .map(|e| RankingSnapshot {
                puuid: puuid.to_string(),
                date: date.to_string(),
                league_points: e.league_points,
                tier: e.tier.clone(),
                rank: e.rank.clone(),
                wins: e.wins,
                losses: e.losses,
                queue_type: e.queue_type.clone(),
            })
    }
}

/// Full match detail with the match id lifted to the top level
/// (matches stream, key `matchId`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(rename = "matchId")]
    pub match_id: String,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

impl MatchRecord {
    /// Wrap a match-v5 payload. The id comes from `metadata.matchId` when
    /// present, otherwise from the id that was requested.
    pub fn from_detail(requested_id: &str, detail: Value) -> Self {
        let mut detail = match detail {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("detail".to_string(), other);
                map
            }
        };
        let match_id = detail
            .get("metadata")
            .and_then(|m| m.get("matchId"))
            .and_then(Value::as_str)
            .unwrap_or(requested_id)
            .to_string();
        detail.remove("matchId");
        MatchRecord { match_id, detail }
    }
}

// ============================================================================
// Timeline
// ============================================================================

/// Raw match-v5 timeline response (only the fields the tap uses)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTimeline {
    pub info: RawTimelineInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTimelineInfo {
    #[serde(default)]
    pub participants: Vec<RawParticipant>,
    #[serde(default)]
    pub frames: Vec<RawFrame>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawParticipant {
    pub participant_id: u32,
    pub puuid: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFrame {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub participant_frames: BTreeMap<String, Value>,
    #[serde(default)]
    pub events: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DamageStats {
    pub magic_damage_done: f64,
    pub magic_damage_done_to_champions: f64,
    pub magic_damage_taken: f64,
    pub physical_damage_done: f64,
    pub physical_damage_done_to_champions: f64,
    pub physical_damage_taken: f64,
    pub total_damage_done: f64,
    pub total_damage_done_to_champions: f64,
    pub total_damage_taken: f64,
    pub true_damage_done: f64,
    pub true_damage_done_to_champions: f64,
    pub true_damage_taken: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One participant's state at one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MatchFrame {
    pub current_gold: f64,
    pub damage_stats: DamageStats,
    pub gold_per_second: f64,
    pub jungle_minions_killed: f64,
    pub level: f64,
    pub minions_killed: f64,
    pub player_id: String,
    pub position: Position,
    pub time_enemy_spent_controlled: f64,
    pub total_gold: f64,
    pub xp: f64,
    pub timestamp: f64,
}

/// Flattened timeline (match_timelines stream, key `matchId`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTimeline {
    pub frames: Vec<MatchFrame>,
    pub events: Vec<Value>,
    pub match_id: String,
}

impl MatchTimeline {
    /// Flatten a raw timeline: one `MatchFrame` per (frame, participant),
    /// keyed by the participant's puuid, ordered by frame then participant id.
    /// Participant frames with an unknown id or an undecodable body are dropped.
    pub fn from_raw(match_id: &str, raw: RawTimeline) -> Self {
        let puuids: BTreeMap<u32, String> = raw
            .info
            .participants
            .into_iter()
            .map(|p| (p.participant_id, p.puuid))
            .collect();

        let mut frames = Vec::new();
        let mut events = Vec::new();

        for frame in raw.info.frames {
            let timestamp = frame.timestamp as f64;
            events.extend(frame.events);

            let mut by_participant: Vec<(u32, Value)> = frame
                .participant_frames
                .into_iter()
                .filter_map(|(id, body)| id.parse::<u32>().ok().map(|id| (id, body)))
                .collect();
            by_participant.sort_by_key(|(id, _)| *id);

            for (participant_id, body) in by_participant {
                let Some(puuid) = puuids.get(&participant_id) else {
                    continue;
                };
                let Ok(mut match_frame) = serde_json::from_value::<MatchFrame>(body) else {
                    continue;
                };
                match_frame.timestamp = timestamp;
                match_frame.player_id = puuid.clone();
                frames.push(match_frame);
            }
        }

        MatchTimeline {
            frames,
            events,
            match_id: match_id.to_string(),
        }
    }
}
