//! Client for the [Bitnodes](https://bitnodes.io/api/) REST API.
//!
//! The crate wraps the public endpoints (snapshots, addresses, node status and
//! latency, the Peer Index leaderboard, and block/transaction propagation)
//! behind [`BitnodesClient`]. Unauthenticated use is limited to 50 requests a
//! day, which the client enforces locally before sending anything. With a key
//! pair configured requests are signed and the local quota no longer applies.
//!
//! # Modules
//!
//! - [`client`] - the client and its endpoint table
//! - [`auth`] - key storage and request signing
//! - [`rate_limit`] - the unauthenticated quota and throttling detection
//! - [`pagination`] - lazy walks over listing endpoints
//! - [`http`] - the transport seam and its reqwest implementation
//! - [`models`] - typed API records
//! - [`config`] / [`log`] - configuration loading and log4rs setup

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod log;
pub mod models;
pub mod pagination;
pub mod rate_limit;

pub use crate::auth::{KeyStore, PrivateKeySource, RequestSigner};
pub use crate::client::BitnodesClient;
pub use crate::config::{ClientConfig, load_configuration};
pub use crate::error::{BitnodesError, BitnodesResult};
pub use crate::pagination::{Page, PageWalker};
pub use crate::rate_limit::RateLimitGuard;
