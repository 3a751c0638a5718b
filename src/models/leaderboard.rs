use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A node's Peer Index (PIX) and rank.
///
/// Used both for leaderboard listings and for the single-node ranking. The
/// component indices (`vi`, `si`, `hi`, ...) are decimal strings and are kept
/// in `indices` as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub node: String,
    pub peer_index: String,
    pub rank: u64,
    #[serde(flatten)]
    pub indices: BTreeMap<String, serde_json::Value>,
}

impl LeaderboardEntry {
    pub fn index(&self, name: &str) -> Option<&str> {
        self.indices.get(name).and_then(|v| v.as_str())
    }
}
