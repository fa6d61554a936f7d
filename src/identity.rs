//! Riot ID handling
//!
//! Tracked players are configured as `gameName#tagLine`. The raw string is the
//! identity used for sharding and watermark keys; the parsed halves are only
//! needed when a lane resolves the account.

use crate::error::SyncError;
use std::fmt;

/// A parsed `gameName#tagLine` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RiotId {
    pub game_name: String,
    pub tag_line: String,
}

impl RiotId {
    /// Parse a configured player string.
    ///
    /// Exactly one `#` separator is accepted; anything else is an
    /// `InvalidIdentity` data error.
    pub fn parse(player: &str) -> Result<Self, SyncError> {
        let mut parts = player.split('#');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(game_name), Some(tag_line), None) => Ok(RiotId {
                game_name: game_name.to_string(),
                tag_line: tag_line.to_string(),
            }),
            _ => Err(SyncError::InvalidIdentity(player.to_string())),
        }
    }
}

impl fmt::Display for RiotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.game_name, self.tag_line)
    }
}
