use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::transport::RetryPolicy;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// TOTP parameters used when enrolling a second factor.
///
/// The identity service chooses the enrollment parameters itself, so no
/// request sends these; they are carried on [`ClientConfig`] for the caller,
/// e.g. to label authenticator entries or validate codes locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct TotpConfig {
    pub issuer: Option<String>,
    pub digits: u32,
    pub period: u32,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            digits: 6,
            period: 30,
        }
    }
}

impl TotpConfig {
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }
}

/// Aether Identity client configuration.
///
/// Required fields are constructor parameters; everything else has a default
/// and can be overridden with the `with_*` methods.
///
/// ```rust,ignore
/// use aether_identity::ClientConfig;
///
/// let config = ClientConfig::new("https://identity.example.com".parse()?, "my-app")
///     .with_system_key("sk_live_...")
///     .with_max_retries(5);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) base_url: Url,
    pub(crate) client_id: String,
    pub(crate) system_key: Option<String>,
    pub(crate) access_token: Option<String>,
    pub(crate) retry: RetryPolicy,
    pub(crate) timeout: Duration,
    pub(crate) totp: Option<TotpConfig>,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: Url, client_id: impl Into<String>) -> Self {
        Self {
            base_url,
            client_id: client_id.into(),
            system_key: None,
            access_token: None,
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            totp: None,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `AETHER_BASE_URL`: identity service base URL
    /// - `AETHER_CLIENT_ID`: client identifier
    ///
    /// # Optional env vars
    /// - `AETHER_SYSTEM_KEY`: system key for registration and machine enrollment
    /// - `AETHER_ACCESS_TOKEN`: initial access token
    /// - `AETHER_MAX_RETRIES`: attempts per request (default 3)
    /// - `AETHER_RETRY_DELAY_MS`: base backoff delay in milliseconds (default 1000)
    /// - `AETHER_TIMEOUT_SECS`: per-attempt timeout in seconds (default 30)
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
        if let Some(token) = env_var("AETHER_ACCESS_TOKEN") {
            config = config.with_access_token(token);
        }
        if let Some(retries) = env_parse::<u32>("AETHER_MAX_RETRIES")? {
            config = config.with_max_retries(retries);
        }
        if let Some(ms) = env_parse::<u64>("AETHER_RETRY_DELAY_MS")? {
            config = config.with_retry_delay(Duration::from_millis(ms));
        }
        if let Some(secs) = env_parse::<u64>("AETHER_TIMEOUT_SECS")? {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_system_key(mut self, key: impl Into<String>) -> Self {
        self.system_key = Some(key.into());
        self
    }

    /// Access token to seed the session with (stored with a one hour lifetime).
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach TOTP parameters for the caller to read back through
    /// [`ClientConfig::totp`]. Not sent to the service.
    #[must_use]
    pub fn with_totp(mut self, totp: TotpConfig) -> Self {
        self.totp = Some(totp);
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
    pub fn system_key(&self) -> Option<&str> {
        self.system_key.as_deref()
    }

    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn totp(&self) -> Option<&TotpConfig> {
        self.totp.as_ref()
    }
}

pub(crate) fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_parse<T>(name: &str) -> Result<Option<T>, Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{name}: {e}")))
        })
        .transpose()
}

pub(crate) fn required_base_env() -> Result<(Url, String), Error> {
    let base_url = env_var("AETHER_BASE_URL")
        .ok_or_else(|| Error::Config("AETHER_BASE_URL is required".into()))?;
    let base_url: Url = base_url
        .parse()
        .map_err(|e| Error::Config(format!("AETHER_BASE_URL: {e}")))?;
    let client_id = env_var("AETHER_CLIENT_ID")
        .ok_or_else(|| Error::Config("AETHER_CLIENT_ID is required".into()))?;
    Ok((base_url, client_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ClientConfig {
        ClientConfig::new("https://identity.example.com".parse().unwrap(), "test-client")
    }

    #[test]
    fn test_config_defaults() {
        let config = test_config();

        assert_eq!(config.client_id(), "test-client");
        assert_eq!(config.base_url().as_str(), "https://identity.example.com/");
        assert_eq!(config.system_key(), None);
        assert_eq!(config.retry().max_retries, 3);
        assert_eq!(config.retry().retry_delay, Duration::from_secs(1));
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.totp().is_none());
    }

    #[test]
    fn test_config_with_overrides() {
        let config = test_config()
            .with_system_key("sk")
            .with_access_token("at")
            .with_max_retries(5)
            .with_retry_delay(Duration::from_millis(10))
            .with_timeout(Duration::from_secs(2))
            .with_totp(TotpConfig::default().with_issuer("Aether"));

        assert_eq!(config.system_key(), Some("sk"));
        assert_eq!(config.access_token.as_deref(), Some("at"));
        assert_eq!(config.retry().max_retries, 5);
        assert_eq!(config.retry().retry_delay, Duration::from_millis(10));
        assert_eq!(config.timeout(), Duration::from_secs(2));
        let totp = config.totp().unwrap();
        assert_eq!(totp.issuer.as_deref(), Some("Aether"));
        assert_eq!(totp.digits, 6);
        assert_eq!(totp.period, 30);
    }
}
