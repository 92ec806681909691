use serde_json::Value as JsonValue;

use super::json_body;
use crate::error::Error;
use crate::session::SessionManager;
use crate::transport::Transport;
use crate::types::{
    AuthInput, OAuthParams, RegisterInput, RegisterResponse, StrengthenInput, TokenResponse,
};

/// Login, registration and logout.
#[derive(Debug, Clone, Copy)]
pub struct Auth<'a> {
    transport: &'a Transport,
    session: &'a SessionManager,
}

impl<'a> Auth<'a> {
    pub(super) fn new(transport: &'a Transport, session: &'a SessionManager) -> Self {
        Self { transport, session }
    }

    /// Log in with email and password and store the issued tokens.
    ///
    /// OAuth parameters, when given, are sent alongside the credentials.
    ///
    /// # Errors
    ///
    /// [`Error::TotpRequired`] when the account needs a TOTP code that was not
    /// supplied, [`Error::Authentication`] for bad credentials, or any
    /// transport error.
    pub async fn login(
        &self,
        input: AuthInput,
        oauth: Option<OAuthParams>,
    ) -> Result<TokenResponse, Error> {
        let body = json_body(&input, oauth.as_ref())?;
        let tokens: TokenResponse = self
            .transport
            .post("/api/v1/auth/login", Some(&body), None)
            .await?;
        self.session.set_tokens(&tokens);
        tracing::debug!(expires_in = tokens.expires_in, "Login succeeded");
        Ok(tokens)
    }

    /// Register a new account. Authenticated with the system key.
    pub async fn register(&self, input: RegisterInput) -> Result<RegisterResponse, Error> {
        let body = serde_json::to_value(&input)?;
        self.transport
            .post_as_system("/api/v1/auth/register", Some(&body))
            .await
    }

    /// End the session.
    ///
    /// The remote call is made only when an access token is held and its
    /// failure is ignored; the local session is always cleared.
    pub async fn logout(&self) {
        if let Some(token) = self.session.access_token() {
            if let Err(e) = self
                .transport
                .request(
                    reqwest::Method::POST,
                    "/api/v1/auth/logout",
                    None,
                    Some(&token),
                    false,
                )
                .await
            {
                tracing::warn!(error = %e, "Remote logout failed, clearing local session");
            }
        }
        self.session.clear();
    }

    /// Step up the current session with a second factor.
    pub async fn strengthen(&self, input: StrengthenInput) -> Result<JsonValue, Error> {
        let body = serde_json::to_value(&input)?;
        let token = self.session.access_token();
        self.transport
            .post("/api/v1/auth/strengthen", Some(&body), token.as_deref())
            .await
    }
}
