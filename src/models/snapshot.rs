use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One entry of the snapshot listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub url: String,
    pub timestamp: u64,
    pub total_nodes: u64,
    pub latest_height: u64,
}

/// Nodes reachable at the time of a snapshot.
///
/// `nodes` is kept as returned: its shape depends on the requested
/// [`SnapshotField`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNodes {
    pub timestamp: u64,
    pub total_nodes: u64,
    pub latest_height: u64,
    pub nodes: serde_json::Value,
}

/// Reduced views of a snapshot's node list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotField {
    Coordinates,
    UserAgents,
}

impl SnapshotField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotField::Coordinates => "coordinates",
            SnapshotField::UserAgents => "user_agents",
        }
    }
}

impl std::fmt::Display for SnapshotField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SnapshotField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coordinates" => Ok(SnapshotField::Coordinates),
            "user_agents" => Ok(SnapshotField::UserAgents),
            _ => Err("Field must be either 'coordinates' or 'user_agents'.".to_string()),
        }
    }
}
