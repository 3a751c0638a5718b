use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::http::{DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::rate_limit::{DEFAULT_WINDOW, UNAUTHENTICATED_DAILY_LIMIT};

pub const DEFAULT_BASE_URL: &str = "https://bitnodes.io/api/v1/";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub user_agent: String,
    pub unauthenticated_limit: u32,
    pub rate_window_secs: u64,
    pub public_key: Option<String>,
    pub private_key_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            unauthenticated_limit: UNAUTHENTICATED_DAILY_LIMIT,
            rate_window_secs: DEFAULT_WINDOW.as_secs(),
            public_key: None,
            private_key_path: None,
        }
    }
}

impl ClientConfig {
    /// The base URL with a guaranteed trailing slash, so relative endpoint
    /// paths join under it instead of replacing its last segment.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        if self.base_url.ends_with('/') {
            Url::parse(&self.base_url)
        } else {
            Url::parse(&format!("{}/", self.base_url))
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }
}
