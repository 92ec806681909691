use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::hooks::ServerHooks;
use crate::config::{env_parse, env_var, required_base_env, DEFAULT_TIMEOUT};
use crate::error::Error;
use crate::types::DEFAULT_CONTEXT;

/// When a second factor is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MfaPolicy {
    /// Required (or not) in every context.
    Uniform(bool),
    /// Required only in the listed contexts.
    Contexts(Vec<String>),
}

impl Default for MfaPolicy {
    fn default() -> Self {
        Self::Uniform(false)
    }
}

impl MfaPolicy {
    #[must_use]
    pub fn applies_to(&self, context: &str) -> bool {
        match self {
            Self::Uniform(required) => *required,
            Self::Contexts(contexts) => contexts.iter().any(|c| c == context),
        }
    }
}

/// Parses `true`/`false`/`1`/`0`, otherwise a comma-separated context list.
impl FromStr for MfaPolicy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("true") || s == "1" {
            return Ok(Self::Uniform(true));
        }
        if s.eq_ignore_ascii_case("false") || s == "0" || s.is_empty() {
            return Ok(Self::Uniform(false));
        }
        Ok(Self::Contexts(
            s.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }
}

/// Validated-token cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_size: 1000,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self { ttl, max_size }
    }
}

/// Where and how incoming requests carry their token.
#[derive(Debug, Clone)]
pub(crate) struct TokenSource {
    pub(crate) header: String,
    pub(crate) prefix: String,
    pub(crate) cookie: String,
}

impl Default for TokenSource {
    fn default() -> Self {
        Self {
            header: "authorization".into(),
            prefix: "bearer".into(),
            cookie: "aether_token".into(),
        }
    }
}

/// Aether Identity server configuration.
///
/// Required fields are constructor parameters; override the rest with the
/// `with_*` methods, or use [`from_env()`](ServerConfig::from_env).
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ServerConfig {
    pub(crate) base_url: Url,
    pub(crate) client_id: String,
    pub(crate) system_key: Option<String>,
    pub(crate) default_context: String,
    pub(crate) mfa_required: MfaPolicy,
    pub(crate) token_source: TokenSource,
    pub(crate) cache: CacheConfig,
    pub(crate) timeout: Duration,
    pub(crate) hooks: ServerHooks,
}

impl ServerConfig {
    #[must_use]
    pub fn new(base_url: Url, client_id: impl Into<String>) -> Self {
        Self {
            base_url,
            client_id: client_id.into(),
            system_key: None,
            default_context: DEFAULT_CONTEXT.into(),
            mfa_required: MfaPolicy::default(),
            token_source: TokenSource::default(),
            cache: CacheConfig::default(),
            timeout: DEFAULT_TIMEOUT,
            hooks: ServerHooks::default(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `AETHER_BASE_URL`: identity service base URL
    /// - `AETHER_CLIENT_ID`: client identifier
    ///
    /// # Optional env vars
    /// - `AETHER_SYSTEM_KEY`: system key sent as `X-System-Key`
    /// - `AETHER_CACHE_TTL_SECS`: validated-token cache TTL (default 300)
    /// - `AETHER_CACHE_MAX_SIZE`: validated-token cache capacity (default 1000)
    /// - `AETHER_MFA_REQUIRED`: `true`, `false` or a comma-separated context list
    /// - `AETHER_COOKIE_NAME`: token cookie name (default `aether_token`)
    /// - `AETHER_TOKEN_HEADER`: token header name (default `authorization`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, Error> {
        let (base_url, client_id) = required_base_env()?;
        let mut config = Self::new(base_url, client_id);

        if let Some(key) = env_var("AETHER_SYSTEM_KEY") {
            config = config.with_system_key(key);
        }
        if let Some(secs) = env_parse::<u64>("AETHER_CACHE_TTL_SECS")? {
            config.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(max_size) = env_parse::<usize>("AETHER_CACHE_MAX_SIZE")? {
            config.cache.max_size = max_size;
        }
        if let Some(policy) = env_parse::<MfaPolicy>("AETHER_MFA_REQUIRED")? {
            config = config.with_mfa_required(policy);
        }
        if let Some(name) = env_var("AETHER_COOKIE_NAME") {
            config = config.with_cookie_name(name);
        }
        if let Some(header) = env_var("AETHER_TOKEN_HEADER") {
            config = config.with_token_header(header);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_system_key(mut self, key: impl Into<String>) -> Self {
        self.system_key = Some(key.into());
        self
    }

    /// Context assumed when the validation response names none.
    #[must_use]
    pub fn with_default_context(mut self, context: impl Into<String>) -> Self {
        self.default_context = context.into();
        self
    }

    #[must_use]
    pub fn with_mfa_required(mut self, policy: MfaPolicy) -> Self {
        self.mfa_required = policy;
        self
    }

    /// Header read for the token (case-insensitive).
    #[must_use]
    pub fn with_token_header(mut self, header: impl Into<String>) -> Self {
        self.token_source.header = header.into();
        self
    }

    /// Scheme expected before the token in the header (case-insensitive).
    #[must_use]
    pub fn with_token_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.token_source.prefix = prefix.into();
        self
    }

    /// Cookie consulted when the token header is absent.
    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.token_source.cookie = name.into();
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: ServerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn default_context(&self) -> &str {
        &self.default_context
    }

    #[must_use]
    pub fn mfa_required(&self) -> &MfaPolicy {
        &self.mfa_required
    }

    #[must_use]
    pub fn token_header(&self) -> &str {
        &self.token_source.header
    }

    #[must_use]
    pub fn token_prefix(&self) -> &str {
        &self.token_source.prefix
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.token_source.cookie
    }

    #[must_use]
    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }
}
