//! The four streams the tap exports, with their key fields and schema
//! descriptors.

use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Stream identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKind {
    Matches,
    MatchTimelines,
    Elos,
    Accounts,
}

impl StreamKind {
    /// Default sync order when no catalog selects streams
    pub const ALL: [StreamKind; 4] = [
        StreamKind::Matches,
        StreamKind::MatchTimelines,
        StreamKind::Elos,
        StreamKind::Accounts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Matches => "matches",
            StreamKind::MatchTimelines => "match_timelines",
            StreamKind::Elos => "elos",
            StreamKind::Accounts => "accounts",
        }
    }

    pub fn key_properties(&self) -> &'static [&'static str] {
        match self {
            StreamKind::Matches | StreamKind::MatchTimelines => &["matchId"],
            StreamKind::Elos => &["puuid", "date"],
            StreamKind::Accounts => &["puuid"],
        }
    }

    /// JSON schema descriptor sent in the SCHEMA message and the catalog
    pub fn schema(&self) -> Value {
        match self {
            StreamKind::Accounts => json!({
                "type": "object",
                "properties": {
                    "puuid": {"type": "string"},
                    "gameName": {"type": "string"},
                    "tagLine": {"type": "string"}
                },
                "required": ["puuid"]
            }),
            StreamKind::Elos => json!({
                "type": "object",
                "properties": {
                    "puuid": {"type": "string"},
                    "date": {"type": "string", "format": "date"},
                    "leaguePoints": {"type": "integer"},
                    "tier": {"type": "string"},
                    "rank": {"type": "string"},
                    "wins": {"type": "integer"},
                    "losses": {"type": "integer"},
                    "queueType": {"type": "string"}
                },
                "required": ["puuid", "date"]
            }),
            StreamKind::Matches => json!({
                "type": "object",
                "properties": {
                    "matchId": {"type": "string"},
                    "metadata": {"type": "object"},
                    "info": {"type": "object"}
                },
                "required": ["matchId"],
                "additionalProperties": true
            }),
            StreamKind::MatchTimelines => json!({
                "type": "object",
                "properties": {
                    "matchId": {"type": "string"},
                    "frames": {"type": "array", "items": frame_schema()},
                    "events": {"type": "array", "items": {"type": "object"}}
                },
                "required": ["matchId", "frames", "events"]
            }),
        }
    }
}

fn frame_schema() -> Value {
    let number = json!({"type": "number"});
    let damage: serde_json::Map<String, Value> = [
        "magicDamageDone",
        "magicDamageDoneToChampions",
        "magicDamageTaken",
        "physicalDamageDone",
        "physicalDamageDoneToChampions",
        "physicalDamageTaken",
        "totalDamageDone",
        "totalDamageDoneToChampions",
        "totalDamageTaken",
        "trueDamageDone",
        "trueDamageDoneToChampions",
        "trueDamageTaken",
    ]
    .iter()
    .map(|k| (k.to_string(), number.clone()))
    .collect();

    json!({
        "type": "object",
        "properties": {
            "currentGold": number,
            "damageStats": {"type": "object", "properties": damage},
            "goldPerSecond": number,
            "jungleMinionsKilled": number,
            "level": number,
            "minionsKilled": number,
            "playerId": {"type": "string"},
            "position": {"type": "object", "properties": {"x": number, "y": number}},
            "timeEnemySpentControlled": number,
            "totalGold": number,
            "xp": number,
            "timestamp": number
        }
    })
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StreamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StreamKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("Unknown stream: {}", s))
    }
}
