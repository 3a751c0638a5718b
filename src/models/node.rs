use serde::{Deserialize, Serialize};

/// Status of an activated node.
///
/// `data` is the positional tuple Bitnodes returns (protocol version, user
/// agent, connected since, services, height, hostname, city, country code,
/// latitude, longitude, timezone, ASN, organization). `mbps` is kept as the
/// string the server sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub address: String,
    pub status: String,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    #[serde(default)]
    pub mbps: String,
}

impl NodeStatus {
    pub fn is_up(&self) -> bool {
        self.status == "UP"
    }

    pub fn protocol_version(&self) -> Option<u64> {
        self.data.first().and_then(|v| v.as_u64())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.data.get(1).and_then(|v| v.as_str())
    }

    pub fn height(&self) -> Option<u64> {
        self.data.get(4).and_then(|v| v.as_u64())
    }

    /// Parsed bandwidth; the original string stays in `mbps`.
    pub fn mbps_value(&self) -> Option<f64> {
        self.mbps.parse().ok()
    }
}

/// One point of a latency series.
///
/// `v` is the average latency in milliseconds; `-1` means unreachable and `0`
/// means reachable without latency data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyPoint {
    pub t: i64,
    pub v: i64,
}

impl LatencyPoint {
    pub fn is_reachable(&self) -> bool {
        self.v >= 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLatency {
    #[serde(default)]
    pub daily_latency: Vec<LatencyPoint>,
    #[serde(default)]
    pub weekly_latency: Vec<LatencyPoint>,
    #[serde(default)]
    pub monthly_latency: Vec<LatencyPoint>,
}

/// One result of the address search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub address: String,
    pub port: u16,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
