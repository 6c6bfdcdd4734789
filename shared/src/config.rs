use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use crate::capabilities::{DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS};
use crate::{
    FeedError, DEFAULT_BASE_URL, DEFAULT_IMAGE_CACHE_BYTES, DEFAULT_IMAGE_CACHE_ENTRIES,
    DEFAULT_PER_PAGE, DISCOVER_PER_PAGE, SEARCH_RESULTS_PER_PAGE,
};

pub const ACCESS_KEY_ENV: &str = "UNSPLASH_ACCESS_KEY";
pub const BASE_URL_ENV: &str = "UNSPLASH_BASE_URL";

/// API credential sent as `client_id`. Never printed.
#[derive(Clone)]
pub struct AccessKey(Arc<SecretString>);

impl AccessKey {
    /// Blank keys count as missing.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return None;
        }
        Some(Self(Arc::new(SecretString::new(key))))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessKey([REDACTED])")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageCacheConfig {
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_IMAGE_CACHE_ENTRIES,
            max_bytes: DEFAULT_IMAGE_CACHE_BYTES,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub base_url: String,
    pub access_key: Option<AccessKey>,
    pub timeout: Duration,
    pub default_per_page: u32,
    pub search_per_page: u32,
    pub discover_per_page: u32,
    pub image_cache: ImageCacheConfig,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_key: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            default_per_page: DEFAULT_PER_PAGE,
            search_per_page: SEARCH_RESULTS_PER_PAGE,
            discover_per_page: DISCOVER_PER_PAGE,
            image_cache: ImageCacheConfig::default(),
        }
    }
}

/// On-disk shape; every field is optional.
#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    access_key: Option<String>,
    timeout_ms: Option<u64>,
    default_per_page: Option<u32>,
    search_per_page: Option<u32>,
    discover_per_page: Option<u32>,
    image_cache_max_entries: Option<usize>,
    image_cache_max_bytes: Option<usize>,
}

impl FeedConfig {
    /// Reads the credential (and an optional base URL override) from the
    /// process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.access_key = lookup(ACCESS_KEY_ENV).and_then(AccessKey::new);
        if let Some(base) = lookup(BASE_URL_ENV).filter(|b| !b.trim().is_empty()) {
            config.base_url = base.trim().to_string();
        }
        config
    }

    pub fn from_json_str(json: &str) -> Result<Self, FeedError> {
        let file: FileConfig = serde_json::from_str(json)
            .map_err(|e| FeedError::configuration(format!("malformed config: {e}")))?;

        let defaults = Self::default();
        let config = Self {
            base_url: file.base_url.unwrap_or(defaults.base_url),
            access_key: file.access_key.and_then(AccessKey::new),
            timeout: file
                .timeout_ms
                .map_or(defaults.timeout, Duration::from_millis),
            default_per_page: file.default_per_page.unwrap_or(defaults.default_per_page),
            search_per_page: file.search_per_page.unwrap_or(defaults.search_per_page),
            discover_per_page: file.discover_per_page.unwrap_or(defaults.discover_per_page),
            image_cache: ImageCacheConfig {
                max_entries: file
                    .image_cache_max_entries
                    .unwrap_or(defaults.image_cache.max_entries),
                max_bytes: file
                    .image_cache_max_bytes
                    .unwrap_or(defaults.image_cache.max_bytes),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FeedError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&contents)
    }

    #[must_use]
    pub fn with_access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = AccessKey::new(key);
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// A missing access key is not a validation failure; the client logs it
    /// and keeps working unauthenticated.
    pub fn validate(&self) -> Result<(), FeedError> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| FeedError::configuration(format!("base_url '{}': {e}", self.base_url)))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(FeedError::configuration(format!(
                "base_url must be http or https, got '{}'",
                base.scheme()
            )));
        }
        if base.cannot_be_a_base() || base.host_str().is_none() {
            return Err(FeedError::configuration("base_url must have a host"));
        }

        let timeout_ms = self.timeout.as_millis();
        if timeout_ms == 0 || timeout_ms > u128::from(MAX_TIMEOUT_MS) {
            return Err(FeedError::configuration(format!(
                "timeout must be between 1ms and {MAX_TIMEOUT_MS}ms"
            )));
        }

        for (name, value) in [
            ("default_per_page", self.default_per_page),
            ("search_per_page", self.search_per_page),
            ("discover_per_page", self.discover_per_page),
        ] {
            if value == 0 {
                return Err(FeedError::configuration(format!("{name} must be > 0")));
            }
        }

        if self.image_cache.max_entries == 0 || self.image_cache.max_bytes == 0 {
            return Err(FeedError::configuration(
                "image cache bounds must be > 0",
            ));
        }
        Ok(())
    }
}
