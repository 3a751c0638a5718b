use thiserror::Error;

/// A request that never produced an HTTP response.
///
/// Status handling (throttling, 4xx/5xx) is the client's business; a
/// `TransportError` only means nothing usable came back over the wire.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection, TLS, timeout or body read failure.
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The retry middleware gave up.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    /// A custom transport could not produce a response.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        match self {
            TransportError::RequestFailed(e) => e.is_timeout(),
            TransportError::MiddlewareError(reqwest_middleware::Error::Reqwest(e)) => e.is_timeout(),
            _ => false,
        }
    }
}
