//! The static endpoint table.
//!
//! Paths are relative to the API base URL (`https://bitnodes.io/api/v1/`).
//! Each descriptor is built per call from already-validated arguments.

use reqwest::Method;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Logical name used in logs and errors.
    pub name: &'static str,
    pub path: String,
    pub requires_auth: bool,
    pub method: Method,
}

impl Endpoint {
    fn get(name: &'static str, path: impl Into<String>) -> Self {
        Self {
            name,
            path: path.into(),
            requires_auth: false,
            method: Method::GET,
        }
    }
}

fn node_key(address: &str, port: u16) -> String {
    format!("{}-{}", address, port)
}

pub fn snapshots() -> Endpoint {
    Endpoint::get("snapshots", "snapshots/")
}

pub fn snapshot_nodes(timestamp: &str) -> Endpoint {
    Endpoint::get("snapshot_nodes", format!("snapshots/{}/", timestamp))
}

pub fn addresses() -> Endpoint {
    Endpoint::get("addresses", "addresses/")
}

pub fn node_status(address: &str, port: u16) -> Endpoint {
    Endpoint::get("node_status", format!("nodes/{}/", node_key(address, port)))
}

pub fn node_latency(address: &str, port: u16) -> Endpoint {
    Endpoint::get("node_latency", format!("nodes/{}/latency/", node_key(address, port)))
}

pub fn leaderboard() -> Endpoint {
    Endpoint::get("leaderboard", "nodes/leaderboard/")
}

pub fn node_ranking(address: &str, port: u16) -> Endpoint {
    Endpoint::get("node_ranking", format!("nodes/leaderboard/{}/", node_key(address, port)))
}

pub fn propagation_list() -> Endpoint {
    Endpoint::get("propagation_list", "inv/")
}

pub fn propagation(inv_hash: &str) -> Endpoint {
    Endpoint::get("propagation", format!("inv/{}/", inv_hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(node_status("31.47.202.112", 8333).path, "nodes/31.47.202.112-8333/");
        assert_eq!(node_latency("1.2.3.4", 8333).path, "nodes/1.2.3.4-8333/latency/");
        assert_eq!(node_ranking("1.2.3.4", 8333).path, "nodes/leaderboard/1.2.3.4-8333/");
        assert_eq!(snapshot_nodes("latest").path, "snapshots/latest/");
        assert_eq!(propagation("ab12").path, "inv/ab12/");
        assert!(!snapshots().requires_auth);
        assert_eq!(leaderboard().method, Method::GET);
    }
}
