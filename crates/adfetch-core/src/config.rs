//! Client configuration.
//!
//! Every field has a default except the ad account id and access token.
//! Configuration comes from a TOML document, from `ADFETCH_*` environment
//! variables, or from code, and is checked by [`ClientConfig::validate`]
//! before a client is built.
//!
//! ```toml
//! ad_account_id = "act_1234567890"
//! access_token = "EAAB..."
//! cache_ttl_secs = 300
//!
//! [retry]
//! read_attempts = 5
//! rate_limit_base_ms = 10000
//!
//! [rate_limit]
//! requests_per_minute = 200
//!
//! [fanout]
//! chunk_size = 20
//! workers = 3
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fanout::batched::DEFAULT_CHUNK_SIZE;
use crate::fanout::parallel::DEFAULT_WORKERS;
use crate::graph::GraphSettings;
use crate::retry::RetryConfig;
use crate::throttling::RateLimitConfig;
use crate::transport::MAX_BATCH_SIZE;
use crate::{ResourceId, ValidationError};

pub const ENV_ACCESS_TOKEN: &str = "ADFETCH_ACCESS_TOKEN";
pub const ENV_AD_ACCOUNT_ID: &str = "ADFETCH_AD_ACCOUNT_ID";
pub const ENV_API_VERSION: &str = "ADFETCH_API_VERSION";
pub const ENV_BASE_URL: &str = "ADFETCH_BASE_URL";

const ACCOUNT_PREFIX: &str = "act_";

/// Fan-out sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutConfig {
    /// Parent ids per batched request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Concurrent campaigns in the parallel collector.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// `limit` sent with default list filters.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            workers: default_workers(),
            page_size: default_page_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_page_size() -> u32 {
    100
}

fn default_base_url() -> String {
    String::from("https://graph.facebook.com")
}

fn default_api_version() -> String {
    String::from("v19.0")
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

/// Everything needed to build an [`AdsClient`](crate::AdsClient).
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Ad account id, with or without the `act_` prefix.
    #[serde(default)]
    pub ad_account_id: String,

    #[serde(default)]
    pub access_token: String,

    /// Per-request network timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Lifetime of cached list results; `0` disables caching.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub fanout: FanOutConfig,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("ad_account_id", &self.ad_account_id)
            .field("access_token", &"***")
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("retry", &self.retry)
            .field("rate_limit", &self.rate_limit)
            .field("fanout", &self.fanout)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(ad_account_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            ad_account_id: ad_account_id.into(),
            access_token: access_token.into(),
            request_timeout_ms: default_request_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            fanout: FanOutConfig::default(),
        }
    }

    /// Reads credentials and endpoint overrides from the process environment.
    ///
    /// `FB_ACCESS_TOKEN` and `FB_ACCOUNT_ID` are accepted as fallbacks.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |primary: &'static str, fallback: &str| {
            lookup(primary)
                .or_else(|| lookup(fallback))
                .filter(|value| !value.trim().is_empty())
        };

        let access_token = read(ENV_ACCESS_TOKEN, "FB_ACCESS_TOKEN").ok_or(ConfigError::MissingEnv {
            name: ENV_ACCESS_TOKEN,
        })?;
        let ad_account_id = read(ENV_AD_ACCOUNT_ID, "FB_ACCOUNT_ID").ok_or(ConfigError::MissingEnv {
            name: ENV_AD_ACCOUNT_ID,
        })?;

        let mut config = Self::new(ad_account_id, access_token);
        if let Some(version) = lookup(ENV_API_VERSION) {
            config.api_version = version;
        }
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            config.base_url = base_url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.account_id()?;
        if self.access_token.trim().is_empty() {
            return Err(ValidationError::EmptyAccessToken);
        }
        if self.fanout.chunk_size == 0 {
            return Err(ValidationError::ZeroChunkSize);
        }
        if self.fanout.chunk_size > MAX_BATCH_SIZE {
            return Err(ValidationError::ChunkSizeTooLarge {
                size: self.fanout.chunk_size,
                max: MAX_BATCH_SIZE,
            });
        }
        if self.fanout.workers == 0 {
            return Err(ValidationError::ZeroWorkers);
        }
        if self.retry.read_attempts == 0 || self.retry.mutation_attempts == 0 {
            return Err(ValidationError::ZeroAttempts);
        }
        Ok(())
    }

    /// The ad account id with its `act_` prefix.
    pub fn account_id(&self) -> Result<ResourceId, ValidationError> {
        normalize_account_id(&self.ad_account_id)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn graph_settings(&self) -> GraphSettings {
        GraphSettings {
            base_url: self.base_url.clone(),
            api_version: self.api_version.clone(),
            access_token: self.access_token.clone(),
            timeout_ms: self.request_timeout_ms,
            ..GraphSettings::new(String::new())
        }
    }
}

/// Adds the `act_` prefix to a bare numeric account id.
pub fn normalize_account_id(raw: &str) -> Result<ResourceId, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == ACCOUNT_PREFIX {
        return Err(ValidationError::EmptyAccountId);
    }
    if trimmed.starts_with(ACCOUNT_PREFIX) {
        ResourceId::parse(trimmed)
    } else {
        ResourceId::parse(&format!("{ACCOUNT_PREFIX}{trimmed}"))
    }
}
