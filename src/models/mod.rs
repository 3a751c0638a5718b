//! Typed records returned by the Bitnodes API.
//!
//! The client core only looks at the listing envelope ([`Page`](crate::Page));
//! these types describe the payloads inside it and the single-resource
//! responses.
//!
//! # Key Types
//!
//! - [`Snapshot`] - Summary of one crawl of the network
//! - [`SnapshotNodes`] - Node list of a snapshot, keyed by `address:port`
//! - [`AddressEntry`] - Result of the address search
//! - [`NodeStatus`] - Status of an activated node
//! - [`NodeLatency`] - Daily, weekly and monthly latency series
//! - [`LeaderboardEntry`] - Peer Index (PIX) ranking of a node
//! - [`InvSummary`] / [`Propagation`] - Propagation statistics per inventory hash

pub mod leaderboard;
pub use leaderboard::LeaderboardEntry;
pub mod node;
pub use node::{AddressEntry, LatencyPoint, NodeLatency, NodeStatus};
pub mod propagation;
pub use propagation::{InvSummary, Propagation, PropagationStats};
pub mod snapshot;
pub use snapshot::{Snapshot, SnapshotField, SnapshotNodes};
