use serde_json::Value as JsonValue;

use super::json_body;
use crate::error::Error;
use crate::session::SessionManager;
use crate::transport::Transport;
use crate::types::{
    OAuthParams, TokenResponse, TotpLoginInput, TotpSetupResponse, TotpStatusResponse,
    TotpVerifyInput,
};

/// Time-based one-time password enrollment and login.
#[derive(Debug, Clone, Copy)]
pub struct Totp<'a> {
    transport: &'a Transport,
    session: &'a SessionManager,
}

impl<'a> Totp<'a> {
    pub(super) fn new(transport: &'a Transport, session: &'a SessionManager) -> Self {
        Self { transport, session }
    }

    /// Start enrollment; returns the shared secret and its QR code.
    pub async fn setup(&self) -> Result<TotpSetupResponse, Error> {
        let token = self.session.access_token();
        self.transport
            .post("/api/v1/auth/totp/setup", None, token.as_deref())
            .await
    }

    pub async fn verify(&self, input: TotpVerifyInput) -> Result<JsonValue, Error> {
        let body = serde_json::to_value(&input)?;
        let token = self.session.access_token();
        self.transport
            .post("/api/v1/auth/totp/verify", Some(&body), token.as_deref())
            .await
    }

    pub async fn disable(&self) -> Result<JsonValue, Error> {
        let token = self.session.access_token();
        self.transport
            .post("/api/v1/auth/totp/disable", None, token.as_deref())
            .await
    }

    pub async fn status(&self) -> Result<TotpStatusResponse, Error> {
        let token = self.session.access_token();
        self.transport
            .get("/api/v1/auth/totp/status", token.as_deref())
            .await
    }

    /// Log in with password and TOTP code and store the issued tokens.
    pub async fn login(
        &self,
        input: TotpLoginInput,
        oauth: Option<OAuthParams>,
    ) -> Result<TokenResponse, Error> {
        let body = json_body(&input, oauth.as_ref())?;
        let tokens: TokenResponse = self
            .transport
            .post("/api/v1/auth/totp/login", Some(&body), None)
            .await?;
        self.session.set_tokens(&tokens);
        Ok(tokens)
    }
}
