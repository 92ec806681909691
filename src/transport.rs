use std::time::Duration;

use reqwest::header::HeaderValue;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use url::Url;

use crate::error::Error;

/// Header carrying the client identifier on every request.
pub const CLIENT_ID_HEADER: &str = "X-Client-ID";

/// Header carrying the system key when it is not used as the bearer token.
pub const SYSTEM_KEY_HEADER: &str = "X-System-Key";

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Retry policy for a single logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero behaves like one.
    pub max_retries: u32,
    /// Base delay; attempt `n` (0-based) waits `retry_delay * 2^n` before the next try.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Delay to wait after the failed attempt `attempt` (0-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.retry_delay.checked_mul(factor).unwrap_or(Duration::MAX)
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Result of one HTTP attempt.
enum Attempt {
    Done(Result<JsonValue, Error>),
    Retry(Error),
}

/// HTTP transport to the identity service.
///
/// Joins endpoints onto the base URL, attaches identification headers, maps
/// error responses onto [`Error`] and retries 5xx responses and connectivity
/// failures with exponential backoff. 4xx responses are never retried.
#[derive(Debug, Clone)]
pub struct Transport {
    base_url: String,
    client_id: String,
    system_key: Option<String>,
    retry: RetryPolicy,
    http: reqwest::Client,
}

impl Transport {
    /// Create a transport with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the client id is not a valid header value
    /// or the HTTP client cannot be built.
    pub fn new(
        base_url: &Url,
        client_id: impl Into<String>,
        system_key: Option<String>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let client_id = client_id.into();
        HeaderValue::from_str(&client_id).map_err(|e| Error::Config(format!("client id: {e}")))?;
        if let Some(key) = &system_key {
            HeaderValue::from_str(key).map_err(|e| Error::Config(format!("system key: {e}")))?;
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;

        Ok(Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            client_id,
            system_key,
            retry,
            http,
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    ///
    /// The client id header is attached per request, so any client works.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        access_token: Option<&str>,
    ) -> Result<T, Error> {
        let value = self
            .request(Method::GET, endpoint, None, access_token, false)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&JsonValue>,
        access_token: Option<&str>,
    ) -> Result<T, Error> {
        let value = self
            .request(Method::POST, endpoint, body, access_token, false)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// POST authenticated with the system key as the bearer token.
    pub async fn post_as_system<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&JsonValue>,
    ) -> Result<T, Error> {
        let value = self
            .request(Method::POST, endpoint, body, None, true)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&JsonValue>,
        access_token: Option<&str>,
    ) -> Result<T, Error> {
        let value = self
            .request(Method::PUT, endpoint, body, access_token, false)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        access_token: Option<&str>,
    ) -> Result<T, Error> {
        let value = self
            .request(Method::DELETE, endpoint, None, access_token, false)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Issue a request with retries and return the JSON body.
    ///
    /// An empty 2xx body yields an empty object.
    ///
    /// # Errors
    ///
    /// - [`Error::Network`] when every attempt failed to reach the service.
    /// - [`Error::Server`] (or the kind selected by the body `code`) when every
    ///   attempt got a 5xx response.
    /// - The mapped kind of a 4xx response, immediately.
    /// - [`Error::Decode`] when a 2xx body is not valid JSON.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&JsonValue>,
        access_token: Option<&str>,
        use_system_key_as_auth: bool,
    ) -> Result<JsonValue, Error> {
        let attempts = self.retry.attempts();
        let mut last_error = None;

        for attempt in 0..attempts {
            tracing::debug!(
                method = %method,
                endpoint,
                attempt = attempt + 1,
                max_attempts = attempts,
                "Sending identity request"
            );

            let outcome = match self
                .send(method.clone(), endpoint, body, access_token, use_system_key_as_auth)
                .await
            {
                Ok(response) => Self::read_response(response).await,
                Err(e @ Error::Network(_)) => Attempt::Retry(e),
                Err(e) => Attempt::Done(Err(e)),
            };

            match outcome {
                Attempt::Done(result) => return result,
                Attempt::Retry(e) => {
                    tracing::warn!(
                        endpoint,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %e,
                        "Identity request failed"
                    );
                    last_error = Some(e);
                    if attempt + 1 < attempts {
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                    }
                }
            }
        }

        match last_error {
            Some(Error::Network(msg)) => Err(Error::Network(format!(
                "request failed after {attempts} attempts: {msg}"
            ))),
            Some(e) => Err(e),
            None => Err(Error::Network(format!(
                "request failed after {attempts} attempts"
            ))),
        }
    }

    /// Send a single attempt with the identification headers applied.
    ///
    /// Connectivity failures come back as [`Error::Network`]; the response is
    /// returned as-is whatever its status.
    pub(crate) async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&JsonValue>,
        access_token: Option<&str>,
        use_system_key_as_auth: bool,
    ) -> Result<reqwest::Response, Error> {
        let url = self.endpoint_url(endpoint)?;
        let mut request = self
            .http
            .request(method, url)
            .header(CLIENT_ID_HEADER, &self.client_id);

        match (access_token, self.system_key.as_deref()) {
            (Some(token), _) => request = request.bearer_auth(token),
            (None, Some(key)) if use_system_key_as_auth => request = request.bearer_auth(key),
            (None, Some(key)) => request = request.header(SYSTEM_KEY_HEADER, key),
            (None, None) => {}
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        request
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))
    }

    async fn read_response(response: reqwest::Response) -> Attempt {
        let status = response.status();
        let request_id = request_id(response.headers());

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Attempt::Retry(Error::Network(e.to_string())),
        };

        if status.is_success() {
            if bytes.is_empty() {
                return Attempt::Done(Ok(JsonValue::Object(Default::default())));
            }
            return Attempt::Done(serde_json::from_slice(&bytes).map_err(Error::from));
        }

        if status.is_server_error() {
            let body = error_body(&bytes, "Server error");
            return Attempt::Retry(Error::from_response(status.as_u16(), &body, request_id));
        }

        let body = error_body(&bytes, "Request failed");
        Attempt::Done(Err(Error::from_response(
            status.as_u16(),
            &body,
            request_id,
        )))
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, Error> {
        let joined = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        joined
            .parse()
            .map_err(|e| Error::Config(format!("invalid endpoint {endpoint}: {e}")))
    }
}

pub(crate) fn request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Parse an error body, falling back to `{"message": ...}` when it is empty or not JSON.
pub(crate) fn error_body(bytes: &[u8], fallback: &str) -> JsonValue {
    if bytes.is_empty() {
        return serde_json::json!({ "message": fallback });
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| {
        serde_json::json!({ "message": String::from_utf8_lossy(bytes) })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> Transport {
        Transport::new(
            &base.parse().unwrap(),
            "test-client",
            None,
            RetryPolicy::default(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.backoff(64), Duration::MAX);
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts(), 1);
    }

    #[test]
    fn test_endpoint_join_tolerates_slashes() {
        let t = transport("https://identity.example.com/");
        assert_eq!(
            t.endpoint_url("/api/v1/userinfo").unwrap().as_str(),
            "https://identity.example.com/api/v1/userinfo"
        );
        assert_eq!(
            t.endpoint_url("api/v1/userinfo").unwrap().as_str(),
            "https://identity.example.com/api/v1/userinfo"
        );
    }

    #[test]
    fn test_endpoint_join_keeps_base_path() {
        let t = transport("https://example.com/identity");
        assert_eq!(
            t.endpoint_url("/oauth2/token").unwrap().as_str(),
            "https://example.com/identity/oauth2/token"
        );
    }

    #[test]
    fn test_error_body_fallbacks() {
        assert_eq!(error_body(b"", "Server error")["message"], "Server error");
        assert_eq!(error_body(b"gateway down", "x")["message"], "gateway down");
        assert_eq!(error_body(br#"{"code":"X"}"#, "x")["code"], "X");
    }
}
