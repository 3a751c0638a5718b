use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest_retry::{
    RetryTransientMiddleware, Retryable, RetryableStrategy, default_on_request_failure, default_on_request_success,
    policies::ExponentialBackoff,
};
use tokio::sync::RwLock;
use url::Url;

use super::error::TransportError;
use super::types::TransportResponse;
use super::Transport;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_USER_AGENT: &str = concat!("bitnodes-rs/", env!("CARGO_PKG_VERSION"));

/// Retries transient failures except throttling.
///
/// A 429 is handed straight back so the caller sees the rate limit instead of
/// burning more quota on automatic retries.
struct ThrottleAwareStrategy;

impl RetryableStrategy for ThrottleAwareStrategy {
    fn handle(&self, res: &Result<reqwest::Response, reqwest_middleware::Error>) -> Option<Retryable> {
        match res {
            Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => None,
            Ok(response) => default_on_request_success(response),
            Err(error) => default_on_request_failure(error),
        }
    }
}

/// reqwest-backed [`Transport`] with retry of transient failures and a
/// per-request timeout.
pub struct HttpTransport {
    client: reqwest_middleware::ClientWithMiddleware,
    last_latency: RwLock<Option<(Duration, Instant)>>,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            DEFAULT_MAX_RETRIES,
            DEFAULT_USER_AGENT,
        )
    }

    pub fn with_config(timeout: Duration, max_retries: u32, user_agent: &str) -> Result<Self, TransportError> {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

        let inner_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        let client = reqwest_middleware::ClientBuilder::new(inner_client)
            .with(RetryTransientMiddleware::new_with_policy_and_strategy(
                retry_policy,
                ThrottleAwareStrategy,
            ))
            .build();

        Ok(Self {
            client,
            last_latency: RwLock::new(None),
        })
    }

    async fn update_latency(&self, duration: Duration) {
        *self.last_latency.write().await = Some((duration, Instant::now()));
    }

    /// Round-trip time of the most recent request, retries included.
    pub async fn get_latency(&self) -> Option<Duration> {
        self.last_latency.read().await.map(|(d, _)| d)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &Url, headers: HeaderMap) -> Result<TransportResponse, TransportError> {
        let start = Instant::now();

        let resp = self.client.get(url.clone()).headers(headers).send().await?;
        let latency = start.elapsed();
        self.update_latency(latency).await;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await?;
        debug!(
            status = status.as_u16(),
            latency_ms = latency.as_millis() as u64;
            "HTTP: Response received"
        );

        Ok(TransportResponse { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpTransport {
        HttpTransport::with_config(Duration::from_secs(5), 2, "bitnodes-test").unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_status_headers_and_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/snapshots/"))
            .and(header("X-Test", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Served-By", "mock")
                    .set_body_string(r#"{"count":0}"#),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = transport();
        let url = Url::parse(&format!("{}/api/v1/snapshots/", mock_server.uri())).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("X-Test", "1".parse().unwrap());

        let response = transport.fetch(&url, headers).await.unwrap();

        assert!(response.is_success());
        assert_eq!(response.body, r#"{"count":0}"#);
        assert_eq!(response.headers.get("X-Served-By").unwrap(), "mock");
        assert!(transport.get_latency().await.is_some());
    }

    #[tokio::test]
    async fn test_throttled_response_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string(r#"{"detail":"Request was throttled."}"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = transport();
        let url = Url::parse(&mock_server.uri()).unwrap();

        let response = transport.fetch(&url, HeaderMap::new()).await.unwrap();

        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_client_errors_are_returned_as_responses() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"detail":"Not found."}"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = transport();
        let url = Url::parse(&mock_server.uri()).unwrap();

        let response = transport.fetch(&url, HeaderMap::new()).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_slow_response_is_a_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::with_config(Duration::from_millis(200), 0, "bitnodes-test").unwrap();
        let url = Url::parse(&mock_server.uri()).unwrap();

        let err = transport.fetch(&url, HeaderMap::new()).await.unwrap_err();

        assert!(err.is_timeout(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_default_transport_sends_user_agent() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(header("user-agent", DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let url = Url::parse(&mock_server.uri()).unwrap();

        let response = transport.fetch(&url, HeaderMap::new()).await.unwrap();
        assert!(response.is_success());
    }
}
