use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_POLL_SECS: u64 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Where the content generation backend lives and how to authenticate.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl ApiConfig {
    /// Build a config, validating the base URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if `base_url` does not parse.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            base_url: String::new(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };
        Ok(config.with_base_url(base_url)?.with_token(token))
    }

    /// Replace the base URL, keeping every other setting.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if `base_url` does not parse.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let base_url = base_url.into().trim().to_owned();
        if Url::parse(&base_url).is_err() {
            return Err(ConfigError::InvalidBaseUrl { raw: base_url });
        }
        self.base_url = base_url;
        Ok(self)
    }

    /// Replace the bearer token; a blank token means none.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Absolute URL of an endpoint path.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Runtime knobs of the session engine.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub api: ApiConfig,
    pub poll_interval: Duration,
    pub kv_quota_bytes: usize,
}

impl EngineConfig {
    /// Read configuration from `ROADMAP_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unparsable URL or number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read configuration through an arbitrary lookup; blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unparsable URL or number.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let base_url = get("ROADMAP_API_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let api = ApiConfig::new(base_url, get("ROADMAP_API_TOKEN"))?;

        let poll_secs = parse_number(get("ROADMAP_POLL_SECS"), "ROADMAP_POLL_SECS")?
            .unwrap_or(DEFAULT_POLL_SECS);
        let kv_quota_bytes = parse_number(get("ROADMAP_KV_QUOTA_BYTES"), "ROADMAP_KV_QUOTA_BYTES")?
            .map_or(storage::repository::DEFAULT_QUOTA_BYTES, |bytes| {
                usize::try_from(bytes).unwrap_or(usize::MAX)
            });

        Ok(Self {
            api,
            poll_interval: Duration::from_secs(poll_secs.max(1)),
            kv_quota_bytes,
        })
    }
}

fn parse_number(raw: Option<String>, var: &'static str) -> Result<Option<u64>, ConfigError> {
    raw.map(|raw| {
        raw.trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { var, raw })
    })
    .transpose()
}
