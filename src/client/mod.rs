//! Client SDK: one shared transport and session, exposed through
//! per-area handles.
//!
//! ```rust,ignore
//! use aether_identity::{AuthInput, ClientConfig, IdentityClient};
//!
//! let client = IdentityClient::new(ClientConfig::from_env()?)?;
//! client.auth().login(AuthInput::new("ada@example.com", "secret"), None).await?;
//!
//! let profile = client.user().profile().await?;
//! ```

mod auth;
mod device;
mod eid;
mod machine;
mod session;
mod token;
mod totp;
mod user;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

pub use auth::Auth;
pub use device::Devices;
pub use eid::Eid;
pub use machine::Machine;
pub use session::Session;
pub use token::Tokens;
pub use totp::Totp;
pub use user::Users;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::session::{SessionManager, TokenStorage, DEFAULT_TOKEN_LIFETIME_SECS};
use crate::transport::Transport;

/// Aether Identity client.
///
/// Cheap to clone; clones share the HTTP connection pool and the session.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    transport: Transport,
    session: SessionManager,
    config: Arc<ClientConfig>,
}

impl IdentityClient {
    /// Build a client with in-memory token storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built or an
    /// identification header is not a valid header value.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        Self::build(config, SessionManager::new())
    }

    /// Build a client that keeps its tokens in `storage`.
    ///
    /// # Errors
    ///
    /// Same as [`IdentityClient::new`].
    pub fn with_storage(config: ClientConfig, storage: Arc<dyn TokenStorage>) -> Result<Self, Error> {
        Self::build(config, SessionManager::with_storage(storage))
    }

    fn build(config: ClientConfig, session: SessionManager) -> Result<Self, Error> {
        let transport = Transport::new(
            &config.base_url,
            config.client_id.clone(),
            config.system_key.clone(),
            config.retry.clone(),
            config.timeout,
        )?;

        if let Some(token) = &config.access_token {
            session.set_access_token(token, DEFAULT_TOKEN_LIFETIME_SECS);
        }

        Ok(Self {
            transport,
            session,
            config: Arc::new(config),
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.transport = self.transport.with_http_client(client);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    #[must_use]
    pub fn session_manager(&self) -> &SessionManager {
        &self.session
    }

    #[must_use]
    pub fn auth(&self) -> Auth<'_> {
        Auth::new(&self.transport, &self.session)
    }

    #[must_use]
    pub fn session(&self) -> Session<'_> {
        Session::new(&self.transport, &self.session)
    }

    #[must_use]
    pub fn user(&self) -> Users<'_> {
        Users::new(&self.transport, &self.session)
    }

    #[must_use]
    pub fn token(&self) -> Tokens<'_> {
        Tokens::new(&self.transport, &self.session)
    }

    #[must_use]
    pub fn eid(&self) -> Eid<'_> {
        Eid::new(&self.transport, &self.session)
    }

    #[must_use]
    pub fn machine(&self) -> Machine<'_> {
        Machine::new(&self.transport)
    }

    #[must_use]
    pub fn device(&self) -> Devices<'_> {
        Devices::new(&self.transport, &self.session)
    }

    #[must_use]
    pub fn totp(&self) -> Totp<'_> {
        Totp::new(&self.transport, &self.session)
    }
}

/// Serialize `value` into a JSON body and merge the fields of `extra` into it.
///
/// Both must serialize to JSON objects; fields of `extra` overwrite.
pub(crate) fn json_body<T, E>(value: &T, extra: Option<&E>) -> Result<JsonValue, Error>
where
    T: Serialize,
    E: Serialize,
{
    let mut body = serde_json::to_value(value)?;
    if let Some(extra) = extra {
        if let (JsonValue::Object(target), JsonValue::Object(fields)) =
            (&mut body, serde_json::to_value(extra)?)
        {
            target.extend(fields);
        }
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthInput, OAuthParams};

    fn config() -> ClientConfig {
        ClientConfig::new("https://identity.example.com".parse().unwrap(), "test-client")
    }

    #[test]
    fn test_json_body_merges_oauth_params() {
        let params = OAuthParams::new().with_client_id("app").with_state("xyz");
        let body = json_body(&AuthInput::new("a@b.c", "pw"), Some(&params)).unwrap();

        assert_eq!(
            body,
            serde_json::json!({
                "email": "a@b.c",
                "password": "pw",
                "client_id": "app",
                "state": "xyz"
            })
        );
    }

    #[test]
    fn test_json_body_without_extra() {
        let body = json_body(&AuthInput::new("a@b.c", "pw"), None::<&OAuthParams>).unwrap();
        assert_eq!(body.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_initial_access_token_is_stored() {
        let client = IdentityClient::new(config().with_access_token("seed")).unwrap();

        assert_eq!(client.session_manager().access_token().as_deref(), Some("seed"));
        assert!(client.session_manager().is_authenticated());
        assert!(client.session_manager().refresh_token().is_none());
    }

    #[test]
    fn test_clones_share_session() {
        let client = IdentityClient::new(config()).unwrap();
        let clone = client.clone();

        clone.session_manager().set_access_token("shared", 600);

        assert_eq!(client.session_manager().access_token().as_deref(), Some("shared"));
    }
}
