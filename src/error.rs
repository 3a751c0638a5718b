//! Crate-level error type.
//!
//! [`BitnodesError`] separates failures the caller can act on (local rate limit,
//! server throttling, bad arguments) from protocol and transport failures. Every
//! error raised after a request has been issued names the logical endpoint that
//! failed.

use std::time::Duration;

use thiserror::Error;

use crate::http::TransportError;

/// Errors returned by the Bitnodes client.
#[derive(Debug, Error)]
pub enum BitnodesError {
    /// A public key or private key source was rejected during local validation.
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// A call argument failed local validation. No request was sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The private key could not be read or used at signing time.
    ///
    /// This is never downgraded to an unauthenticated request.
    #[error("Signing error: {0}")]
    Signing(String),

    /// The endpoint only accepts signed requests and no key pair is configured.
    #[error("{endpoint}: authentication required but no key pair is configured")]
    AuthRequired { endpoint: &'static str },

    /// The local unauthenticated quota is exhausted for the current window.
    ///
    /// Raised before any network call. The caller should wait `resets_in`.
    #[error(
        "Unauthenticated quota exhausted ({calls}/{limit} calls), window resets in {}s",
        .resets_in.as_secs()
    )]
    WouldExceed {
        /// Calls already made in the current window.
        calls: u32,
        /// Calls allowed per window.
        limit: u32,
        /// Time until the local window rolls over.
        resets_in: Duration,
    },

    /// The server throttled the request.
    ///
    /// The quota was already consumed server-side.
    #[error("{endpoint}: request throttled by server: {detail}")]
    RateLimited {
        endpoint: &'static str,
        /// Server-provided wait before the next request, when known.
        retry_after: Option<Duration>,
        /// The throttling message returned by the server.
        detail: String,
    },

    /// A page URL repeated within a single pagination walk.
    #[error("{endpoint}: pagination cycle detected at {url}")]
    PaginationCycle { endpoint: &'static str, url: String },

    /// The transport failed before a response was received.
    #[error("{endpoint}: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: TransportError,
    },

    /// The server answered with a non-success status that is not throttling.
    #[error("{endpoint}: server returned {status}: {body}")]
    Server {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    /// The response body did not match the expected record shape.
    #[error("{endpoint}: could not decode response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The client could not be built from its configuration.
    #[error("Invalid client configuration: {0}")]
    Config(String),

    /// A request or pagination URL could not be built.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl BitnodesError {
    /// Returns true for conditions that clear once the caller waits.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, BitnodesError::WouldExceed { .. } | BitnodesError::RateLimited { .. })
    }

    /// Suggested wait before retrying, if the error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BitnodesError::WouldExceed { resets_in, .. } => Some(*resets_in),
            BitnodesError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

// Convenience alias
pub type BitnodesResult<T> = Result<T, BitnodesError>;
