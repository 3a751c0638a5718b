//! HMAC request signing.
//!
//! A [`SignatureScheme`] turns the request URL, the public key and the private
//! key bytes into an [`AuthMaterial`]. [`RequestSigner`] owns the scheme and
//! the nonce counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use log::debug;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::Sha256;
use url::Url;

use super::key_store::KeyStore;
use crate::error::{BitnodesError, BitnodesResult};

type HmacSha256 = Hmac<Sha256>;

pub const PUBKEY_HEADER: &str = "pubkey";
pub const NONCE_HEADER: &str = "nonce";
pub const SIG_HEADER: &str = "sig";
pub const SIG_PREFIX: &str = "HMAC-SHA256:";

/// The parts of a request that authentication covers.
#[derive(Debug, Clone, Copy)]
pub struct RequestDescriptor<'a> {
    pub method: &'a Method,
    /// Full request URL, query string included.
    pub url: &'a Url,
}

/// Headers and query parameters that authenticate a single request.
#[derive(Debug, Clone, Default)]
pub struct AuthMaterial {
    headers: HeaderMap,
    query: Vec<(String, String)>,
}

impl AuthMaterial {
    pub fn from_headers(headers: HeaderMap) -> Self {
        Self {
            headers,
            query: Vec::new(),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Adds a header. Names and values must be valid HTTP header text.
    pub fn insert_header(&mut self, name: &str, value: &str) -> BitnodesResult<()> {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| BitnodesError::Signing(format!("'{}' is not a valid header name", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| BitnodesError::Signing(format!("Value for header '{}' is not valid ASCII", name)))?;
        self.headers.insert(header_name, value);
        Ok(())
    }

    /// Adds a query parameter, appended to the request URL after signing.
    pub fn insert_query(&mut self, name: &str, value: &str) {
        self.query.push((name.to_string(), value.to_string()));
    }

    /// Moves the headers into `headers` and the query parameters onto `url`.
    pub fn apply_to(self, headers: &mut HeaderMap, url: &mut Url) {
        headers.extend(self.headers);
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
        }
    }
}

/// Turns a request and a key pair into authentication headers.
///
/// Implementations receive the private key only for the duration of the call
/// and must not retain it.
pub trait SignatureScheme: Send + Sync {
    fn sign(
        &self,
        request: &RequestDescriptor<'_>,
        public_key: &str,
        private_key: &[u8],
        nonce: u64,
    ) -> BitnodesResult<AuthMaterial>;
}

/// HMAC-SHA256 over `"{public_key}:{nonce}:{url}"`.
///
/// Headers: `pubkey`, `nonce` and `sig: HMAC-SHA256:<hex digest>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256Scheme;

impl HmacSha256Scheme {
    pub fn message(public_key: &str, nonce: u64, url: &Url) -> String {
        format!("{}:{}:{}", public_key, nonce, url)
    }
}

impl SignatureScheme for HmacSha256Scheme {
    fn sign(
        &self,
        request: &RequestDescriptor<'_>,
        public_key: &str,
        private_key: &[u8],
        nonce: u64,
    ) -> BitnodesResult<AuthMaterial> {
        let mut mac = HmacSha256::new_from_slice(private_key)
            .map_err(|_| BitnodesError::Signing("Invalid private key length".to_string()))?;
        mac.update(Self::message(public_key, nonce, request.url).as_bytes());
        let sig_hex = hex::encode(mac.finalize().into_bytes());

        let mut material = AuthMaterial::default();
        material.insert_header(PUBKEY_HEADER, public_key)?;
        material.insert_header(NONCE_HEADER, &nonce.to_string())?;
        material.insert_header(SIG_HEADER, &format!("{}{}", SIG_PREFIX, sig_hex))?;
        Ok(material)
    }
}

/// Produces per-request authentication from a [`KeyStore`].
pub struct RequestSigner {
    scheme: Box<dyn SignatureScheme>,
    last_nonce: AtomicU64,
}

impl Default for RequestSigner {
    fn default() -> Self {
        Self::with_scheme(HmacSha256Scheme)
    }
}

impl RequestSigner {
    pub fn with_scheme(scheme: impl SignatureScheme + 'static) -> Self {
        Self {
            scheme: Box::new(scheme),
            last_nonce: AtomicU64::new(0),
        }
    }

    /// Signs `request` when `keys` holds a full key pair.
    ///
    /// Returns `Ok(None)` for an unauthenticated store. The private key is read
    /// fresh from its source and wiped before this returns; a source that has
    /// become unreadable is a [`BitnodesError::Signing`] error.
    pub fn sign(&self, request: &RequestDescriptor<'_>, keys: &KeyStore) -> BitnodesResult<Option<AuthMaterial>> {
        let (Some(public_key), Some(source)) = (keys.public_key(), keys.private_key_source()) else {
            return Ok(None);
        };

        let private_key = source.read()?;
        let nonce = self.next_nonce();
        let material = self.scheme.sign(request, public_key, &private_key, nonce)?;
        drop(private_key);

        debug!(target: "bitnodes::audit", nonce = nonce; "Request signed");
        Ok(Some(material))
    }

    /// Microsecond timestamp, strictly increasing across calls on this signer.
    fn next_nonce(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_micros() as u64;
        let prev = self
            .last_nonce
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or_else(|last| last);
        now.max(prev + 1)
    }
}
