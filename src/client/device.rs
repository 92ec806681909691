use serde_json::Value as JsonValue;

use crate::error::Error;
use crate::session::SessionManager;
use crate::transport::Transport;
use crate::types::{DeviceInfo, DeviceStatusResponse};

/// Devices known for the current user.
#[derive(Debug, Clone, Copy)]
pub struct Devices<'a> {
    transport: &'a Transport,
    session: &'a SessionManager,
}

impl<'a> Devices<'a> {
    pub(super) fn new(transport: &'a Transport, session: &'a SessionManager) -> Self {
        Self { transport, session }
    }

    /// List devices. A response that is not a JSON array yields an empty list.
    pub async fn detect(&self) -> Result<Vec<DeviceInfo>, Error> {
        let token = self.session.access_token();
        let body: JsonValue = self
            .transport
            .get("/api/v1/devices", token.as_deref())
            .await?;

        match body {
            JsonValue::Array(_) => Ok(serde_json::from_value(body)?),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn status(&self) -> Result<DeviceStatusResponse, Error> {
        let token = self.session.access_token();
        self.transport
            .get("/api/v1/devices/status", token.as_deref())
            .await
    }
}
