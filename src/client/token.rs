use reqwest::Method;

use crate::error::Error;
use crate::session::SessionManager;
use crate::transport::Transport;
use crate::types::TokenResponse;

/// Refresh and revoke the session tokens.
#[derive(Debug, Clone, Copy)]
pub struct Tokens<'a> {
    transport: &'a Transport,
    session: &'a SessionManager,
}

impl<'a> Tokens<'a> {
    pub(super) fn new(transport: &'a Transport, session: &'a SessionManager) -> Self {
        Self { transport, session }
    }

    /// Exchange the stored refresh token for a new token pair and store it.
    ///
    /// # Errors
    ///
    /// [`Error::NoRefreshToken`] when no refresh token is held; the session is
    /// left untouched when the service rejects the refresh.
    pub async fn refresh(&self) -> Result<TokenResponse, Error> {
        let refresh_token = self.session.refresh_token().ok_or(Error::NoRefreshToken)?;
        let body = serde_json::json!({ "refreshToken": refresh_token });

        let tokens: TokenResponse = self
            .transport
            .post("/api/v1/auth/refresh", Some(&body), None)
            .await?;
        self.session.set_tokens(&tokens);
        Ok(tokens)
    }

    /// Revoke the current access token. Failures are ignored; the local
    /// session is always cleared.
    pub async fn revoke(&self) {
        if let Some(token) = self.session.access_token() {
            if let Err(e) = self
                .transport
                .request(
                    Method::POST,
                    "/api/v1/auth/token/revoke",
                    None,
                    Some(&token),
                    false,
                )
                .await
            {
                tracing::warn!(error = %e, "Token revocation failed, clearing local session");
            }
        }
        self.session.clear();
    }
}
