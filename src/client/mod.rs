//! The Bitnodes API client.
//!
//! [`BitnodesClient`] runs every request through the same steps: local
//! argument validation, the unauthenticated quota check, signing when a key
//! pair is configured, the transport round-trip and response classification.
//! Listing endpoints additionally come with a `walk_*` method that follows the
//! server's `next` links lazily.
//!
//! ```no_run
//! # async fn demo() -> bitnodes::BitnodesResult<()> {
//! let client = bitnodes::BitnodesClient::new()?;
//! let status = client.get_node_status("31.47.202.112", 8333).await?;
//! println!("{} is {}", status.address, status.status);
//!
//! let snapshots = client.walk_snapshots(Some(25))?;
//! let mut cursor = snapshots.walk();
//! while let Some(snapshot) = cursor.next().await? {
//!     println!("{} nodes at {}", snapshot.total_nodes, snapshot.timestamp);
//! }
//! # Ok(())
//! # }
//! ```

pub mod endpoints;
pub mod validation;

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use url::Url;

use self::endpoints::Endpoint;
use self::validation::{
    MAX_PAGE_SIZE, validate_address_port, validate_inv_hash, validate_limit, validate_page, validate_query,
    validate_timestamp,
};
use crate::auth::{KeyStore, PrivateKeySource, RequestDescriptor, RequestSigner};
use crate::config::ClientConfig;
use crate::error::{BitnodesError, BitnodesResult};
use crate::http::{HttpTransport, Transport};
use crate::models::{
    AddressEntry, InvSummary, LeaderboardEntry, NodeLatency, NodeStatus, Propagation, Snapshot, SnapshotField,
    SnapshotNodes,
};
use crate::pagination::{Page, PageFetcher, PageWalker};
use crate::rate_limit::{Preflight, RateLimitGuard, ResponseClass};

/// Client for the Bitnodes REST API.
///
/// All methods take `&self`; a client can be shared between tasks behind an
/// `Arc`. Credential changes apply to the next request and never to one that
/// is already being signed.
pub struct BitnodesClient {
    base_url: Url,
    transport: Arc<dyn Transport>,
    keys: RwLock<KeyStore>,
    signer: RequestSigner,
    rate_limit: RateLimitGuard,
}

impl BitnodesClient {
    /// A client with default settings and credentials taken from
    /// `BITNODES_PUBLIC_KEY` / `BITNODES_PRIVATE_KEY_PATH`.
    pub fn new() -> BitnodesResult<Self> {
        Self::from_config(&ClientConfig::default())
    }

    /// Builds a client from a loaded configuration.
    ///
    /// Credentials present in the configuration must be valid; missing ones
    /// fall back to the environment.
    pub fn from_config(config: &ClientConfig) -> BitnodesResult<Self> {
        let base_url = config.base_url()?;
        let transport = HttpTransport::with_config(config.timeout(), config.max_retries, &config.user_agent)
            .map_err(|e| BitnodesError::Config(format!("Could not build HTTP transport: {}", e)))?;
        let keys = KeyStore::with_credentials(
            config.public_key.clone(),
            config.private_key_path.clone().map(PrivateKeySource::file),
            |name| std::env::var(name).ok(),
        )?;
        let rate_limit = RateLimitGuard::new(config.unauthenticated_limit, config.rate_window());

        debug!(
            base_url:% = base_url,
            authenticated = keys.has_auth(),
            limit = config.unauthenticated_limit;
            "Bitnodes client created"
        );
        Ok(Self::with_parts(base_url, Arc::new(transport), keys, rate_limit))
    }

    /// Assembles a client from its collaborators.
    pub fn with_parts(
        mut base_url: Url,
        transport: Arc<dyn Transport>,
        keys: KeyStore,
        rate_limit: RateLimitGuard,
    ) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            transport,
            keys: RwLock::new(keys),
            signer: RequestSigner::default(),
            rate_limit,
        }
    }

    /// Replaces the signer, e.g. to use a different [`SignatureScheme`](crate::auth::SignatureScheme).
    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = signer;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn read_keys(&self) -> RwLockReadGuard<'_, KeyStore> {
        self.keys.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_keys(&self) -> RwLockWriteGuard<'_, KeyStore> {
        self.keys.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_public_api_key(&self, key: &str) -> BitnodesResult<()> {
        self.write_keys().set_public_key(key)
    }

    /// Points the client at a private key file. The file is checked now and
    /// read again for every signed request.
    pub fn set_private_key_path(&self, path: impl Into<PathBuf>) -> BitnodesResult<()> {
        self.write_keys().set_private_key_path(path)
    }

    /// Supplies the private key in memory instead of through a file.
    pub fn set_private_key(&self, key: impl Into<String>) -> BitnodesResult<()> {
        self.write_keys().set_private_key_source(PrivateKeySource::inline(key))
    }

    /// Drops both credentials; later requests are unauthenticated.
    pub fn clear_credentials(&self) {
        self.write_keys().clear();
    }

    pub fn has_auth(&self) -> bool {
        self.read_keys().has_auth()
    }

    pub fn rate_limit(&self) -> &RateLimitGuard {
        &self.rate_limit
    }

    fn endpoint_url(&self, endpoint: &Endpoint, params: &[(&str, Option<String>)]) -> BitnodesResult<Url> {
        let mut url = self.base_url.join(&endpoint.path)?;
        if params.iter().any(|(_, value)| value.is_some()) {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                if let Some(value) = value {
                    pairs.append_pair(key, value);
                }
            }
        }
        Ok(url)
    }

    /// Performs one request and decodes the body as `R`.
    async fn execute<R: DeserializeOwned>(&self, endpoint: &Endpoint, url: &Url) -> BitnodesResult<R> {
        let mut headers = HeaderMap::new();
        let mut request_url = url.clone();
        {
            let keys = self.read_keys();
            let authenticated = keys.has_auth();
            if endpoint.requires_auth && !authenticated {
                return Err(BitnodesError::AuthRequired { endpoint: endpoint.name });
            }

            if let Preflight::WouldExceed { calls, limit, resets_in } = self.rate_limit.try_acquire(authenticated) {
                return Err(BitnodesError::WouldExceed {
                    calls,
                    limit,
                    resets_in,
                });
            }

            let request = RequestDescriptor {
                method: &endpoint.method,
                url,
            };
            if let Some(auth) = self.signer.sign(&request, &keys)? {
                auth.apply_to(&mut headers, &mut request_url);
            }
        }

        debug!(endpoint = endpoint.name, url:% = request_url; "Sending request");
        let response = self
            .transport
            .fetch(&request_url, headers)
            .await
            .map_err(|source| BitnodesError::Transport {
                endpoint: endpoint.name,
                source,
            })?;

        match RateLimitGuard::classify_response(response.status, &response.headers, &response.body) {
            ResponseClass::Ok => serde_json::from_str(&response.body).map_err(|source| BitnodesError::Decode {
                endpoint: endpoint.name,
                source,
            }),
            ResponseClass::RateLimited { retry_after, detail } => {
                warn!(
                    target: "bitnodes::audit",
                    endpoint = endpoint.name,
                    retry_after_secs:? = retry_after.map(|d| d.as_secs());
                    "Request throttled by server"
                );
                Err(BitnodesError::RateLimited {
                    endpoint: endpoint.name,
                    retry_after,
                    detail,
                })
            },
            ResponseClass::OtherError => {
                warn!(endpoint = endpoint.name, status = response.status.as_u16(); "Request failed");
                Err(BitnodesError::Server {
                    endpoint: endpoint.name,
                    status: response.status.as_u16(),
                    body: response.body,
                })
            },
        }
    }

    /// Fetches a single page and truncates it to `limit` records.
    async fn get_page<R: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        page: Option<u32>,
        limit: Option<u32>,
        extra: &[(&str, Option<String>)],
    ) -> BitnodesResult<Page<R>> {
        validate_page(page)?;
        validate_limit(limit)?;
        let mut params = vec![("page", page.map(|p| p.to_string())), ("limit", limit.map(|l| l.to_string()))];
        params.extend(extra.iter().cloned());

        let url = self.endpoint_url(&endpoint, &params)?;
        let mut result: Page<R> = self.execute(&endpoint, &url).await?;
        if let Some(limit) = limit {
            result.results.truncate(limit as usize);
        }
        Ok(result)
    }

    /// A walker over every record of a listing endpoint, optionally capped at
    /// `max_records`. The server page size is the cap when it is below
    /// [`MAX_PAGE_SIZE`], so a small walk costs a single request.
    fn walker<R>(
        &self,
        endpoint: Endpoint,
        max_records: Option<usize>,
        extra: &[(&str, Option<String>)],
    ) -> BitnodesResult<PageWalker<EndpointPages<'_, R>>> {
        let page_size = max_records
            .filter(|max| *max > 0)
            .map_or(MAX_PAGE_SIZE, |max| max.min(MAX_PAGE_SIZE as usize) as u32);
        let mut params = vec![("limit", Some(page_size.to_string()))];
        params.extend(extra.iter().cloned());

        let start = self.endpoint_url(&endpoint, &params)?;
        let fetcher = EndpointPages {
            client: self,
            endpoint,
            _record: PhantomData,
        };
        Ok(PageWalker::new(fetcher, start).with_max_records(max_records))
    }

    /// Snapshots from the latest to the oldest.
    pub async fn get_snapshots(&self, page: Option<u32>, limit: Option<u32>) -> BitnodesResult<Page<Snapshot>> {
        self.get_page(endpoints::snapshots(), page, limit, &[]).await
    }

    pub fn walk_snapshots(&self, max_records: Option<usize>) -> BitnodesResult<PageWalker<EndpointPages<'_, Snapshot>>> {
        self.walker(endpoints::snapshots(), max_records, &[])
    }

    /// Nodes of one snapshot. `timestamp` is a Unix timestamp or `"latest"`.
    /// With `field` set the server returns only that projection of each node.
    pub async fn get_snapshot_nodes(
        &self,
        timestamp: &str,
        field: Option<SnapshotField>,
    ) -> BitnodesResult<SnapshotNodes> {
        validate_timestamp(timestamp)?;
        let endpoint = endpoints::snapshot_nodes(timestamp);
        let url = self.endpoint_url(&endpoint, &[("field", field.map(|f| f.as_str().to_string()))])?;
        self.execute(&endpoint, &url).await
    }

    /// Addresses seen in the latest snapshot, optionally filtered by search
    /// terms.
    pub async fn get_addresses(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
        q: &[String],
    ) -> BitnodesResult<Page<AddressEntry>> {
        validate_query(q)?;
        let terms = search_terms(q);
        self.get_page(endpoints::addresses(), page, limit, &terms).await
    }

    pub fn walk_addresses(
        &self,
        max_records: Option<usize>,
        q: &[String],
    ) -> BitnodesResult<PageWalker<EndpointPages<'_, AddressEntry>>> {
        validate_query(q)?;
        self.walker(endpoints::addresses(), max_records, &search_terms(q))
    }

    /// Status of an activated node.
    pub async fn get_node_status(&self, address: &str, port: u16) -> BitnodesResult<NodeStatus> {
        let address = validate_address_port(address, port)?;
        let endpoint = endpoints::node_status(&address, port);
        let url = self.endpoint_url(&endpoint, &[])?;
        self.execute(&endpoint, &url).await
    }

    /// Daily, weekly and monthly latency of an activated node.
    pub async fn get_node_latency(&self, address: &str, port: u16) -> BitnodesResult<NodeLatency> {
        let address = validate_address_port(address, port)?;
        let endpoint = endpoints::node_latency(&address, port);
        let url = self.endpoint_url(&endpoint, &[])?;
        self.execute(&endpoint, &url).await
    }

    /// Nodes ranked by Peer Index.
    pub async fn get_leaderboard(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> BitnodesResult<Page<LeaderboardEntry>> {
        self.get_page(endpoints::leaderboard(), page, limit, &[]).await
    }

    pub fn walk_leaderboard(
        &self,
        max_records: Option<usize>,
    ) -> BitnodesResult<PageWalker<EndpointPages<'_, LeaderboardEntry>>> {
        self.walker(endpoints::leaderboard(), max_records, &[])
    }

    /// Peer Index ranking of one node.
    pub async fn get_node_ranking(&self, address: &str, port: u16) -> BitnodesResult<LeaderboardEntry> {
        let address = validate_address_port(address, port)?;
        let endpoint = endpoints::node_ranking(&address, port);
        let url = self.endpoint_url(&endpoint, &[])?;
        self.execute(&endpoint, &url).await
    }

    /// Inventory hashes with propagation statistics, newest first.
    pub async fn get_propagation_list(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> BitnodesResult<Page<InvSummary>> {
        self.get_page(endpoints::propagation_list(), page, limit, &[]).await
    }

    pub fn walk_propagation(
        &self,
        max_records: Option<usize>,
    ) -> BitnodesResult<PageWalker<EndpointPages<'_, InvSummary>>> {
        self.walker(endpoints::propagation_list(), max_records, &[])
    }

    /// Propagation statistics of one block or transaction.
    pub async fn get_propagation(&self, inv_hash: &str) -> BitnodesResult<Propagation> {
        validate_inv_hash(inv_hash)?;
        let endpoint = endpoints::propagation(inv_hash);
        let url = self.endpoint_url(&endpoint, &[])?;
        self.execute(&endpoint, &url).await
    }
}

fn search_terms(q: &[String]) -> Vec<(&'static str, Option<String>)> {
    q.iter().map(|term| ("q", Some(term.trim().to_string()))).collect()
}

/// Fetches the pages of one listing endpoint through its client, so every
/// page goes through the same quota check and signing as a direct call.
pub struct EndpointPages<'a, R> {
    client: &'a BitnodesClient,
    endpoint: Endpoint,
    _record: PhantomData<fn() -> R>,
}

#[async_trait]
impl<'a, R> PageFetcher for EndpointPages<'a, R>
where
    R: DeserializeOwned + Send,
{
    type Record = R;

    fn endpoint(&self) -> &'static str {
        self.endpoint.name
    }

    async fn fetch_page(&self, url: &Url) -> BitnodesResult<Page<R>> {
        self.client.execute(&self.endpoint, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{TransportError, TransportResponse};
    use reqwest::StatusCode;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<(Url, HeaderMap)>>,
        calls: AtomicUsize,
    }

    impl RecordingTransport {
        fn urls(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|(url, _)| url.to_string())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn fetch(&self, url: &Url, headers: HeaderMap) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push((url.clone(), headers));
            Ok(TransportResponse::new(
                StatusCode::OK,
                r#"{"count": 0, "next": null, "previous": null, "results": []}"#,
            ))
        }
    }

    /// Answers every request with the same result.
    struct CannedTransport(fn() -> Result<TransportResponse, TransportError>);

    #[async_trait]
    impl Transport for CannedTransport {
        async fn fetch(&self, _url: &Url, _headers: HeaderMap) -> Result<TransportResponse, TransportError> {
            (self.0)()
        }
    }

    fn canned_client(respond: fn() -> Result<TransportResponse, TransportError>) -> BitnodesClient {
        BitnodesClient::with_parts(
            Url::parse("https://bitnodes.io/api/v1/").unwrap(),
            Arc::new(CannedTransport(respond)),
            KeyStore::new(),
            RateLimitGuard::default(),
        )
    }

    fn client(transport: Arc<RecordingTransport>) -> BitnodesClient {
        BitnodesClient::with_parts(
            Url::parse("https://bitnodes.io/api/v1").unwrap(),
            transport,
            KeyStore::new(),
            RateLimitGuard::default(),
        )
    }

    #[tokio::test]
    async fn test_query_string_skips_missing_parameters() {
        let transport = Arc::new(RecordingTransport::default());
        let client = client(transport.clone());

        client.get_snapshots(None, None).await.unwrap();
        client.get_snapshots(Some(2), Some(100)).await.unwrap();
        client
            .get_addresses(None, Some(5), &["2601:602::1".to_string()])
            .await
            .unwrap();

        assert_eq!(
            transport.urls(),
            vec![
                "https://bitnodes.io/api/v1/snapshots/",
                "https://bitnodes.io/api/v1/snapshots/?page=2&limit=100",
                "https://bitnodes.io/api/v1/addresses/?limit=5&q=2601%3A602%3A%3A1",
            ]
        );
    }

    #[tokio::test]
    async fn test_walker_start_url_uses_capped_page_size() {
        let transport = Arc::new(RecordingTransport::default());
        let client = client(transport.clone());

        let small = client.walk_leaderboard(Some(7)).unwrap();
        assert_eq!(
            small.start_url().as_str(),
            "https://bitnodes.io/api/v1/nodes/leaderboard/?limit=7"
        );
        let all = client.walk_propagation(None).unwrap();
        assert_eq!(all.start_url().as_str(), "https://bitnodes.io/api/v1/inv/?limit=100");

        assert!(all.collect_all().await.unwrap().is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let client = client(transport.clone());

        let results = [
            client.get_snapshots(Some(0), None).await.map(|_| ()),
            client.get_leaderboard(None, Some(101)).await.map(|_| ()),
            client.get_node_status("", 8333).await.map(|_| ()),
            client.get_node_latency("1.2.3.4", 0).await.map(|_| ()),
            client.get_snapshot_nodes("yesterday", None).await.map(|_| ()),
            client.get_propagation("").await.map(|_| ()),
        ];
        for result in results {
            assert!(matches!(result, Err(BitnodesError::InvalidArgument(_))));
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(client.rate_limit().remaining(), 50);
    }

    #[tokio::test]
    async fn test_auth_required_endpoint_without_keys() {
        let transport = Arc::new(RecordingTransport::default());
        let client = client(transport.clone());
        let mut endpoint = endpoints::snapshots();
        endpoint.requires_auth = true;
        let url = client.endpoint_url(&endpoint, &[]).unwrap();

        let result: BitnodesResult<Page<Snapshot>> = client.execute(&endpoint, &url).await;
        assert!(matches!(
            result,
            Err(BitnodesError::AuthRequired { endpoint: "snapshots" })
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(client.rate_limit().remaining(), 50);
    }

    #[tokio::test]
    async fn test_credentials_can_change_between_calls() {
        let transport = Arc::new(RecordingTransport::default());
        let client = client(transport.clone());

        client.set_public_api_key("public").unwrap();
        client.set_private_key("secret").unwrap();
        assert!(client.has_auth());
        client.get_snapshots(None, None).await.unwrap();

        client.clear_credentials();
        assert!(!client.has_auth());
        client.get_snapshots(None, None).await.unwrap();

        let requests = transport.requests.lock().unwrap();
        assert!(requests[0].1.contains_key("sig"));
        assert!(!requests[1].1.contains_key("sig"));
        drop(requests);
        assert_eq!(client.rate_limit().remaining(), 49);
    }

    #[tokio::test]
    async fn test_transport_failure_names_the_endpoint() {
        let client = canned_client(|| Err(TransportError::Unavailable("offline".to_string())));

        match client.get_propagation("abcd").await {
            Err(BitnodesError::Transport { endpoint, source }) => {
                assert_eq!(endpoint, "propagation");
                assert!(matches!(source, TransportError::Unavailable(_)));
                assert!(!source.is_timeout());
            },
            other => panic!("expected Transport error, got {:?}", other),
        }
        // The call was dispatched, so it counts.
        assert_eq!(client.rate_limit().remaining(), 49);
    }

    #[tokio::test]
    async fn test_retry_after_header_reaches_the_caller() {
        let client = canned_client(|| {
            let mut headers = HeaderMap::new();
            headers.insert(reqwest::header::RETRY_AFTER, "90".parse().unwrap());
            Ok(TransportResponse::new(StatusCode::TOO_MANY_REQUESTS, "").with_headers(headers))
        });

        let err = client.get_node_latency("1.2.3.4", 8333).await.unwrap_err();
        assert!(matches!(err, BitnodesError::RateLimited { endpoint: "node_latency", .. }));
        assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(90)));
    }
}
