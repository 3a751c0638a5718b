use serde::{Deserialize, Serialize};

/// One entry of the propagation listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvSummary {
    pub inv_hash: String,
}

/// Propagation statistics for one inventory hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Propagation {
    pub inv_hash: String,
    pub stats: PropagationStats,
}

/// Arrival-time statistics in milliseconds, computed over the first 1000
/// nodes to announce the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationStats {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub std: f64,
    #[serde(rename = "50%")]
    pub median: f64,
    #[serde(rename = "90%")]
    pub p90: f64,
    /// Earliest announcers as `(address:port, arrival time in Unix ms)`.
    #[serde(default)]
    pub head: Vec<(String, u64)>,
}
