use serde_json::{json, Value as JsonValue};

use crate::error::Error;
use crate::transport::Transport;
use crate::types::{MachineEnrollmentResponse, MachineTokenResponse};

/// Machine-to-machine credentials.
///
/// These calls do not touch the user session.
#[derive(Debug, Clone, Copy)]
pub struct Machine<'a> {
    transport: &'a Transport,
}

impl<'a> Machine<'a> {
    pub(super) fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    /// Enroll this machine. Authenticated with the system key.
    pub async fn enroll(&self) -> Result<MachineEnrollmentResponse, Error> {
        self.transport
            .post_as_system("/api/v1/machine/enroll", None)
            .await
    }

    /// Obtain a machine token with the client credentials grant.
    pub async fn token(&self, secret: &str) -> Result<MachineTokenResponse, Error> {
        let body = json!({
            "grant_type": "client_credentials",
            "client_id": self.transport.client_id(),
            "client_secret": secret,
        });
        self.transport.post("/oauth2/token", Some(&body), None).await
    }

    pub async fn revoke(&self, secret: &str) -> Result<JsonValue, Error> {
        let body = json!({ "client_secret": secret });
        self.transport.post("/oauth2/revoke", Some(&body), None).await
    }
}
