//! Configuration for the memory service client.

use std::time::Duration;

use secrecy::SecretString;

/// Production memory service
pub const DEFAULT_BASE_URL: &str = "https://api.yomemo.ai";

/// Header carrying the API key on every request.
pub const API_KEY_HEADER: &str = "x-memo-api-key";

/// Provenance written into default metadata.
pub const DEFAULT_SOURCE_TAG: &str = "memo-mcp";

/// Connection settings for [`crate::MemoClient`].
#[derive(Debug, Clone)]
pub struct MemoConfig {
    /// API key sent in the `X-Memo-API-Key` header.
    pub api_key: SecretString,
    /// Base URL of the memory service, without trailing slash.
    pub base_url: String,
    /// Whole-request timeout.
    pub timeout: Duration,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Value of the `from` key in default metadata.
    pub source_tag: String,
}

impl MemoConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            api_key: SecretString::new(api_key.into()),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            source_tag: DEFAULT_SOURCE_TAG.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_source_tag(mut self, source_tag: impl Into<String>) -> Self {
        self.source_tag = source_tag.into();
        self
    }

    /// The store/retrieve endpoint.
    pub fn memory_url(&self) -> String {
        format!("{}/api/v1/memory", self.base_url)
    }
}
