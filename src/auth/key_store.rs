//! Credential storage.
//!
//! The store keeps the public key and a *means* of obtaining the private key,
//! never the private key itself. File-backed sources are only checked for
//! existence and readability when set; their contents are read by the signer,
//! once per signed request.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use zeroize::Zeroizing;

use crate::error::{BitnodesError, BitnodesResult};
use crate::log::mask_string;

/// Environment variable holding the default public API key.
pub const PUBLIC_KEY_ENV: &str = "BITNODES_PUBLIC_KEY";
/// Environment variable holding the default path to the private key file.
pub const PRIVATE_KEY_PATH_ENV: &str = "BITNODES_PRIVATE_KEY_PATH";

/// Where the private key comes from at signing time.
#[derive(Clone)]
pub enum PrivateKeySource {
    /// A file whose trimmed contents are the private key.
    File(PathBuf),
    /// A key supplied in memory by the embedding application.
    Inline(Zeroizing<String>),
}

impl PrivateKeySource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        PrivateKeySource::File(path.into())
    }

    pub fn inline(value: impl Into<String>) -> Self {
        PrivateKeySource::Inline(Zeroizing::new(value.into()))
    }

    fn validate(&self) -> BitnodesResult<()> {
        match self {
            PrivateKeySource::File(path) => validate_key_file(path),
            PrivateKeySource::Inline(value) if value.trim().is_empty() => Err(BitnodesError::InvalidCredential(
                "Private key must be a non-empty string.".to_string(),
            )),
            PrivateKeySource::Inline(_) => Ok(()),
        }
    }

    /// Reads the key material. The returned buffer is wiped when dropped.
    pub(crate) fn read(&self) -> BitnodesResult<Zeroizing<Vec<u8>>> {
        let raw = match self {
            PrivateKeySource::File(path) => Zeroizing::new(std::fs::read(path).map_err(|e| {
                BitnodesError::Signing(format!("Private key file {} is no longer readable: {}", path.display(), e))
            })?),
            PrivateKeySource::Inline(value) => Zeroizing::new(value.as_bytes().to_vec()),
        };

        let trimmed = Zeroizing::new(raw.trim_ascii().to_vec());
        if trimmed.is_empty() {
            return Err(BitnodesError::Signing("Private key is empty.".to_string()));
        }
        Ok(trimmed)
    }
}

impl fmt::Debug for PrivateKeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivateKeySource::File(path) => f.debug_tuple("File").field(path).finish(),
            PrivateKeySource::Inline(_) => f.write_str("Inline(<redacted>)"),
        }
    }
}

fn validate_key_file(path: &Path) -> BitnodesResult<()> {
    if !path.is_file() {
        return Err(BitnodesError::InvalidCredential(format!(
            "Private key path {} does not exist or is not a file.",
            path.display()
        )));
    }
    // Opening checks permissions without reading the key.
    File::open(path).map_err(|e| {
        BitnodesError::InvalidCredential(format!("Private key path {} is not readable: {}", path.display(), e))
    })?;
    Ok(())
}

/// Holds the public key and the private key source for one client.
#[derive(Debug, Default, Clone)]
pub struct KeyStore {
    public_key: Option<String>,
    private_key: Option<PrivateKeySource>,
}

impl KeyStore {
    /// An empty, unauthenticated store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from explicit credentials, falling back to `lookup` for
    /// whichever part was not supplied. `lookup` is asked for
    /// [`PUBLIC_KEY_ENV`] and [`PRIVATE_KEY_PATH_ENV`].
    ///
    /// Explicit credentials must be valid. Missing or invalid environment
    /// values leave that part unset; the store is then unauthenticated, which
    /// is not an error.
    pub fn with_credentials<F>(
        public_key: Option<String>,
        private_key: Option<PrivateKeySource>,
        lookup: F,
    ) -> BitnodesResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut store = Self::new();
        if let Some(key) = &public_key {
            store.set_public_key(key)?;
        }
        if let Some(source) = private_key {
            store.set_private_key_source(source)?;
        }
        Ok(Self::resolve(store.public_key, store.private_key, lookup))
    }

    fn resolve<F>(public_key: Option<String>, private_key: Option<PrivateKeySource>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut store = Self {
            public_key,
            private_key,
        };

        if store.public_key.is_none()
            && let Some(key) = lookup(PUBLIC_KEY_ENV)
            && let Err(e) = store.set_public_key(&key)
        {
            warn!(var = PUBLIC_KEY_ENV, error:% = e; "Ignoring public key from environment");
        }

        if store.private_key.is_none()
            && let Some(path) = lookup(PRIVATE_KEY_PATH_ENV)
            && let Err(e) = store.set_private_key_source(PrivateKeySource::file(path))
        {
            warn!(var = PRIVATE_KEY_PATH_ENV, error:% = e; "Ignoring private key path from environment");
        }

        store
    }

    /// Sets the public API key. Blank keys are rejected and leave the store
    /// unchanged.
    pub fn set_public_key(&mut self, key: &str) -> BitnodesResult<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(BitnodesError::InvalidCredential(
                "Public key must be a non-empty string.".to_string(),
            ));
        }
        debug!(public_key = &*mask_string(key); "Public key configured");
        self.public_key = Some(key.to_string());
        Ok(())
    }

    /// Sets where the private key is read from at signing time.
    pub fn set_private_key_source(&mut self, source: PrivateKeySource) -> BitnodesResult<()> {
        source.validate()?;
        debug!(source:? = source; "Private key source configured");
        self.private_key = Some(source);
        Ok(())
    }

    pub fn set_private_key_path(&mut self, path: impl Into<PathBuf>) -> BitnodesResult<()> {
        self.set_private_key_source(PrivateKeySource::file(path))
    }

    /// Forgets both credentials.
    pub fn clear(&mut self) {
        self.public_key = None;
        self.private_key = None;
    }

    pub fn has_auth(&self) -> bool {
        self.public_key.is_some() && self.private_key.is_some()
    }

    pub fn public_key(&self) -> Option<&str> {
        self.public_key.as_deref()
    }

    pub(crate) fn private_key_source(&self) -> Option<&PrivateKeySource> {
        self.private_key.as_ref()
    }
}
