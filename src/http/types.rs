use reqwest::StatusCode;
use reqwest::header::HeaderMap;

/// A raw response as seen by the transport: status, headers and body text.
///
/// The body is kept as text so the client can classify throttling responses
/// before attempting to decode a typed record.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
