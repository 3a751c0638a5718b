//! HTTP transport for the Bitnodes API.
//!
//! The client core never talks to the network directly. It hands a fully built
//! URL and the request headers to a [`Transport`] and gets back the raw
//! `(status, headers, body)` triple. Retries of transient failures and
//! timeouts are the transport's business; throttling and record decoding are
//! not.
//!
//! - [`HttpTransport`] - reqwest-backed transport with exponential backoff
//! - [`TransportError`] - failures before a response was received
//! - [`TransportResponse`] - the raw response handed back to the client
//!
//! Tests and alternative front ends can implement [`Transport`] themselves.

mod error;
mod http_client;
mod types;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use url::Url;

pub use error::TransportError;
pub use http_client::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, HttpTransport};
pub use types::TransportResponse;

/// A GET-capable transport.
///
/// Query parameters are already encoded in `url`; pagination cursors returned
/// by the server are passed through untouched.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &Url, headers: HeaderMap) -> Result<TransportResponse, TransportError>;
}
