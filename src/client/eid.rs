use serde_json::Value as JsonValue;

use crate::error::Error;
use crate::session::SessionManager;
use crate::transport::Transport;
use crate::types::{EidStatusResponse, EidVerifyInput};

/// Electronic identity document verification.
#[derive(Debug, Clone, Copy)]
pub struct Eid<'a> {
    transport: &'a Transport,
    session: &'a SessionManager,
}

impl<'a> Eid<'a> {
    pub(super) fn new(transport: &'a Transport, session: &'a SessionManager) -> Self {
        Self { transport, session }
    }

    pub async fn verify(&self, input: EidVerifyInput) -> Result<JsonValue, Error> {
        let body = serde_json::to_value(&input)?;
        let token = self.session.access_token();
        self.transport
            .post("/api/v1/eid/verify", Some(&body), token.as_deref())
            .await
    }

    pub async fn status(&self) -> Result<EidStatusResponse, Error> {
        let token = self.session.access_token();
        self.transport
            .get("/api/v1/eid/status", token.as_deref())
            .await
    }

    pub async fn revoke(&self) -> Result<JsonValue, Error> {
        let token = self.session.access_token();
        self.transport
            .post("/api/v1/eid/revoke", None, token.as_deref())
            .await
    }
}
