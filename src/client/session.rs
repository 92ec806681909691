use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::error::Error;
use crate::session::SessionManager;
use crate::transport::Transport;
use crate::types::{SessionResponse, UserProfile};

/// Session status.
#[derive(Debug, Clone, Copy)]
pub struct Session<'a> {
    transport: &'a Transport,
    session: &'a SessionManager,
}

impl<'a> Session<'a> {
    pub(super) fn new(transport: &'a Transport, session: &'a SessionManager) -> Self {
        Self { transport, session }
    }

    /// Describe the current session.
    ///
    /// Without a stored token, or when the service rejects it, the session is
    /// reported as unauthenticated rather than failing.
    pub async fn current(&self) -> SessionResponse {
        let Some(token) = self.session.access_token() else {
            return SessionResponse::unauthenticated();
        };

        match self.fetch_user(&token).await {
            Ok(user) => SessionResponse {
                is_authenticated: true,
                user,
                expires_at: self
                    .session
                    .expires_at()
                    .and_then(|at| OffsetDateTime::from_unix_timestamp(at).ok()),
            },
            Err(e) => {
                tracing::debug!(error = %e, "Userinfo lookup failed, reporting unauthenticated");
                SessionResponse::unauthenticated()
            }
        }
    }

    async fn fetch_user(&self, token: &str) -> Result<Option<UserProfile>, Error> {
        let info: JsonValue = self.transport.get("/api/v1/userinfo", Some(token)).await?;
        let empty = match &info {
            JsonValue::Null => true,
            JsonValue::Object(fields) => fields.is_empty(),
            _ => false,
        };
        if empty {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(info)?))
    }

    /// Local check only: a token is held and is not about to expire.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }
}
