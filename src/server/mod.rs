//! Server SDK: token validation with caching, lifecycle hooks and request
//! authentication.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use aether_identity::server::{IdentityServer, ServerConfig, ServerHooks};
//! use aether_identity::server::axum::{require_auth, require_roles, AuthLayerState};
//!
//! let server = IdentityServer::new(
//!     ServerConfig::from_env()?.with_hooks(ServerHooks::new().on_login(|event| async move {
//!         tracing::info!(user_id = %event.user_id, success = event.success, "Login");
//!         Ok(())
//!     })),
//! )?;
//! let _cleanup = server.spawn_cache_cleanup(std::time::Duration::from_secs(60));
//!
//! let state = AuthLayerState::from(&server);
//! let app = axum::Router::new()
//!     .route("/admin", get(admin))
//!     .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_roles(["admin"])))
//!     .route_layer(axum::middleware::from_fn_with_state(state, require_auth));
//! ```

#[cfg(feature = "axum")]
pub mod axum;

mod authenticate;
mod cache;
mod config;
mod hooks;
mod validator;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;

pub use authenticate::{AuthRequest, Authenticator};
pub use cache::TokenCache;
pub use config::{CacheConfig, MfaPolicy, ServerConfig};
pub use hooks::{
    HookContext, HookFn, HookManager, HookResult, LoginEvent, LogoutEvent, MfaRequiredEvent,
    RequestId, RequestMeta, RoleCheckEvent, ServerHooks, TokenRefreshEvent,
    UnauthorizedAttemptEvent,
};
pub use validator::{
    extract_token_from_header, has_permission, has_role, requires_mfa, Validator,
};

use crate::error::Error;
use crate::types::UserContext;

/// Aether Identity server.
///
/// Cheap to clone; clones share the token cache and hooks.
#[derive(Debug, Clone)]
pub struct IdentityServer {
    config: Arc<ServerConfig>,
    cache: Arc<TokenCache>,
    hooks: Arc<HookManager>,
    validator: Arc<Validator>,
    authenticator: Authenticator,
}

impl IdentityServer {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built or an
    /// identification header is not a valid header value.
    pub fn new(config: ServerConfig) -> Result<Self, Error> {
        let cache = Arc::new(TokenCache::new(config.cache.ttl, config.cache.max_size));
        let validator = Arc::new(Validator::new(&config, cache.clone())?);
        let hooks = Arc::new(HookManager::new(config.hooks.clone()));
        let authenticator = Authenticator::new(
            validator.clone(),
            hooks.clone(),
            config.token_source.clone(),
            config.mfa_required.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            cache,
            hooks,
            validator,
            authenticator,
        })
    }

    /// Use a custom HTTP client for validation and server-side calls.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        let validator = Arc::new((*self.validator).clone().with_http_client(client));
        self.authenticator = Authenticator::new(
            validator.clone(),
            self.hooks.clone(),
            self.config.token_source.clone(),
            self.config.mfa_required.clone(),
        );
        self.validator = validator;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    #[must_use]
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Log a user in on their behalf and report the outcome to `on_login`.
    ///
    /// The service response is returned as-is.
    ///
    /// # Errors
    ///
    /// Whatever the service answered; the failed attempt is still reported.
    pub async fn login<C: Serialize>(
        &self,
        credentials: &C,
        meta: RequestMeta,
    ) -> Result<JsonValue, Error> {
        let body = serde_json::to_value(credentials)?;
        let email = body
            .get("email")
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string();

        match self
            .validator
            .make_request(Method::POST, "/api/v1/auth/login", Some(&body), None)
            .await
        {
            Ok(response) => {
                let user_id = response
                    .get("userId")
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default();
                self.hooks.on_login(&meta, user_id, &email, true);
                Ok(response)
            }
            Err(e) => {
                self.hooks.on_login(&meta, "", &email, false);
                Err(e)
            }
        }
    }

    /// Log out the owner of `token`.
    ///
    /// Unknown tokens are ignored. For a valid one `on_logout` fires, the
    /// cache entry is dropped and the service is told; a failure of that
    /// call is logged and otherwise ignored.
    pub async fn logout(&self, token: &str, meta: RequestMeta) {
        let Some(user) = self.validator.validate_token(token).await else {
            return;
        };
        self.hooks.on_logout(&meta, &user.id);
        self.cache.delete(token);

        if let Err(e) = self
            .validator
            .make_request(Method::POST, "/api/v1/auth/logout", None, Some(token))
            .await
        {
            tracing::warn!(user_id = %user.id, error = %e, "Remote logout failed");
        }
    }

    /// Exchange a refresh token and report the owner of the new access token
    /// to `on_token_refresh`.
    ///
    /// # Errors
    ///
    /// Whatever the service answered for the refresh.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        meta: RequestMeta,
    ) -> Result<JsonValue, Error> {
        let body = serde_json::json!({ "refreshToken": refresh_token });
        let response = self
            .validator
            .make_request(Method::POST, "/api/v1/auth/refresh", Some(&body), None)
            .await?;

        let access_token = response
            .get("accessToken")
            .and_then(JsonValue::as_str)
            .unwrap_or_default();
        if !access_token.is_empty() {
            if let Some(user) = self.validator.validate_token(access_token).await {
                self.hooks.on_token_refresh(&meta, &user.id);
            }
        }
        Ok(response)
    }

    pub async fn validate_token(&self, token: &str) -> Option<UserContext> {
        self.validator.validate_token(token).await
    }

    pub async fn get_user_from_token(&self, token: &str) -> Option<UserContext> {
        self.validator.validate_token(token).await
    }

    #[must_use]
    pub fn has_role<S: AsRef<str>>(&self, user: &UserContext, roles: &[S]) -> bool {
        has_role(user, roles)
    }

    #[must_use]
    pub fn has_permission<S: AsRef<str>>(&self, user: &UserContext, permissions: &[S]) -> bool {
        has_permission(user, permissions)
    }

    /// Whether the configured policy requires MFA in `context`.
    #[must_use]
    pub fn requires_mfa(&self, context: &str) -> bool {
        requires_mfa(context, &self.config.mfa_required)
    }

    /// Token from a header value, using the configured prefix.
    #[must_use]
    pub fn extract_token_from_header<'a>(&self, value: Option<&'a str>) -> Option<&'a str> {
        extract_token_from_header(value, &self.config.token_source.prefix)
    }

    /// Replace the lifecycle callbacks.
    pub fn register_hooks(&self, hooks: ServerHooks) {
        self.hooks.replace(hooks);
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.cache.size()
    }

    /// Drop expired cache entries; returns how many were removed.
    pub fn cleanup_cache(&self) -> usize {
        self.cache.cleanup()
    }

    /// Run [`cleanup_cache`](Self::cleanup_cache) every `interval` on the
    /// current tokio runtime. Abort the handle to stop.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime or with a zero `interval`.
    #[must_use = "the task runs until the handle is aborted"]
    pub fn spawn_cache_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.cleanup();
                if removed > 0 {
                    tracing::debug!(removed, remaining = cache.size(), "Token cache cleanup");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> IdentityServer {
        IdentityServer::new(
            ServerConfig::new("http://127.0.0.1:9".parse().unwrap(), "api")
                .with_mfa_required(MfaPolicy::Contexts(vec!["admin".into()]))
                .with_cache(CacheConfig::new(Duration::from_secs(300), 10)),
        )
        .unwrap()
    }

    #[test]
    fn test_facade_helpers() {
        let server = server();
        let user = UserContext::new("u1", "e")
            .with_roles(["admin"])
            .with_permissions(["a", "b"]);

        assert!(server.has_role(&user, &["admin"]));
        assert!(server.has_permission(&user, &["a", "b"]));
        assert!(server.requires_mfa("admin"));
        assert!(!server.requires_mfa("user"));
        assert_eq!(server.extract_token_from_header(Some("Bearer t")), Some("t"));
    }

    #[tokio::test]
    async fn test_cache_management() {
        let server = server();
        server
            .cache
            .set("t1", UserContext::new("u1", "e"), None);
        server
            .cache
            .set("t2", UserContext::new("u2", "e"), Some(time::OffsetDateTime::UNIX_EPOCH));

        assert_eq!(server.cache_size(), 2);
        assert_eq!(server.get_user_from_token("t1").await.unwrap().id, "u1");
        assert_eq!(server.cleanup_cache(), 1);
        assert_eq!(server.cache_size(), 1);

        server.clear_cache();
        assert_eq!(server.cache_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_cleanup_removes_expired_entries() {
        let server = server();
        server.cache.set(
            "stale",
            UserContext::new("u1", "e"),
            Some(time::OffsetDateTime::UNIX_EPOCH),
        );

        let handle = server.spawn_cache_cleanup(Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(server.cache_size(), 0);
        handle.abort();
    }

    #[test]
    fn test_clones_share_cache() {
        let server = server();
        let clone = server.clone();
        clone.cache.set("t", UserContext::new("u", "e"), None);
        assert_eq!(server.cache_size(), 1);
    }
}
