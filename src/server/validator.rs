use std::collections::BTreeSet;
use std::sync::Arc;

use reqwest::header::HeaderValue;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::cache::TokenCache;
use super::config::{MfaPolicy, ServerConfig};
use crate::error::Error;
use crate::transport::{error_body, request_id, CLIENT_ID_HEADER, SYSTEM_KEY_HEADER};
use crate::types::UserContext;

const VALIDATE_ENDPOINT: &str = "/api/v1/auth/validate";

/// Remote token validation backed by the [`TokenCache`].
///
/// Validation never fails: an unknown, expired or unverifiable token, or an
/// unreachable service, all read as "no user". Only successful validations
/// are cached.
#[derive(Debug, Clone)]
pub struct Validator {
    base_url: String,
    client_id: String,
    system_key: Option<String>,
    default_context: String,
    http: reqwest::Client,
    cache: Arc<TokenCache>,
}

/// Body of a successful validation response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidationPayload {
    #[serde(default)]
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    roles: BTreeSet<String>,
    #[serde(default)]
    permissions: BTreeSet<String>,
    #[serde(default)]
    mfa_verified: bool,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    expires_at: Option<JsonValue>,
}

impl Validator {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built or an
    /// identification header is not a valid header value.
    pub fn new(config: &ServerConfig, cache: Arc<TokenCache>) -> Result<Self, Error> {
        HeaderValue::from_str(&config.client_id)
            .map_err(|e| Error::Config(format!("client id: {e}")))?;
        if let Some(key) = &config.system_key {
            HeaderValue::from_str(key).map_err(|e| Error::Config(format!("system key: {e}")))?;
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            system_key: config.system_key.clone(),
            default_context: config.default_context.clone(),
            http,
            cache,
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Resolve `token` to the user it was issued to.
    ///
    /// A cache hit returns without touching the network. A miss makes one
    /// validation call; anything but a 200 with a well-formed body yields
    /// `None` and leaves the cache unchanged.
    pub async fn validate_token(&self, token: &str) -> Option<UserContext> {
        if let Some(user) = self.cache.get(token) {
            return Some(user);
        }

        let response = match self
            .http
            .get(self.endpoint_url(VALIDATE_ENDPOINT))
            .header(CLIENT_ID_HEADER, &self.client_id)
            .bearer_auth(token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "Token validation request failed");
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            tracing::debug!(status = response.status().as_u16(), "Token rejected");
            return None;
        }

        let payload: ValidationPayload = match response.json().await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(error = %e, "Malformed token validation response");
                return None;
            }
        };

        let expires_at = payload.expires_at.as_ref().and_then(token_expiry);
        let user = UserContext {
            id: payload.id,
            email: payload.email,
            roles: payload.roles,
            permissions: payload.permissions,
            mfa_verified: payload.mfa_verified,
            context: payload
                .context
                .unwrap_or_else(|| self.default_context.clone()),
        };

        self.cache.set(token, user.clone(), expires_at);
        Some(user)
    }

    /// Single-attempt server-side call authenticated with the system key.
    ///
    /// The system key (when configured) goes in `X-System-Key`; `bearer`, when
    /// given, is sent as the `Authorization` header alongside it. An empty
    /// success body yields `{}`.
    ///
    /// # Errors
    ///
    /// [`Error::Network`] on connectivity failure, the mapped kind for a
    /// non-success status, [`Error::Decode`] for a malformed success body.
    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&JsonValue>,
        bearer: Option<&str>,
    ) -> Result<JsonValue, Error> {
        let mut request = self
            .http
            .request(method, self.endpoint_url(endpoint))
            .header(CLIENT_ID_HEADER, &self.client_id);
        if let Some(key) = &self.system_key {
            request = request.header(SYSTEM_KEY_HEADER, key);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let status = response.status();
        let request_id = request_id(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !status.is_success() {
            let body = error_body(&bytes, "Request failed");
            return Err(Error::from_response(status.as_u16(), &body, request_id));
        }
        if bytes.is_empty() {
            return Ok(JsonValue::Object(Default::default()));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

/// Token expiry from a validation payload: unix seconds or an RFC 3339 string.
fn token_expiry(value: &JsonValue) -> Option<OffsetDateTime> {
    match value {
        JsonValue::Number(n) => {
            let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            OffsetDateTime::from_unix_timestamp(secs).ok()
        }
        JsonValue::String(s) => OffsetDateTime::parse(s, &Rfc3339).ok(),
        _ => None,
    }
}

/// True if the user holds at least one of `roles`.
#[must_use]
pub fn has_role<S: AsRef<str>>(user: &UserContext, roles: &[S]) -> bool {
    roles.iter().any(|role| user.roles.contains(role.as_ref()))
}

/// True if the user holds every one of `permissions`. An empty requirement is
/// always satisfied.
#[must_use]
pub fn has_permission<S: AsRef<str>>(user: &UserContext, permissions: &[S]) -> bool {
    permissions
        .iter()
        .all(|permission| user.permissions.contains(permission.as_ref()))
}

#[must_use]
pub fn requires_mfa(context: &str, policy: &MfaPolicy) -> bool {
    policy.applies_to(context)
}

/// Token from a `<scheme> <token>` header value.
///
/// The value must split on whitespace into exactly two parts and the scheme
/// must match `prefix` ignoring ASCII case.
#[must_use]
pub fn extract_token_from_header<'a>(value: Option<&'a str>, prefix: &str) -> Option<&'a str> {
    let mut parts = value?.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case(prefix) {
        return None;
    }
    Some(token)
}
