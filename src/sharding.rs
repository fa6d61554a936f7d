//! Player → lane routing
//!
//! Each tracked player is pinned to one credential lane by hashing the raw
//! player string. The mapping only depends on (player, lane count), so every
//! run routes a player through the same key. The hash must be stable across
//! builds, hence a SHA-1 prefix rather than `DefaultHasher`.

use sha1::{Digest, Sha1};

/// Lane index for a player, in `[0, lane_count)`
///
/// `lane_count` must be at least 1; callers get there by validating that the
/// config has at least one API key.
#[inline]
pub fn shard_index(player: &str, lane_count: usize) -> usize {
    debug_assert!(lane_count > 0, "lane_count must be positive");
    if lane_count <= 1 {
        return 0;
    }

    let digest = Sha1::digest(player.as_bytes());
    let hash = match digest.get(..8).and_then(|b| <[u8; 8]>::try_from(b).ok()) {
        Some(prefix) => u64::from_be_bytes(prefix),
        None => u64::from(crc32fast::hash(player.as_bytes())),
    };

    let idx = (hash % lane_count as u64) as usize;
    debug_assert!(idx < lane_count, "Hash produced invalid shard index");
    idx
}

/// Split players into one shard per lane
///
/// Players keep their configured order inside a shard. Shards may be empty.
pub fn partition(players: &[String], lane_count: usize) -> Vec<Vec<String>> {
    let lane_count = lane_count.max(1);
    let mut shards = vec![Vec::new(); lane_count];
    for player in players {
        shards[shard_index(player, lane_count)].push(player.clone());
    }
    shards
}
