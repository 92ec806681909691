use std::fmt;

use serde_json::Value as JsonValue;

/// Stable error codes reported by the identity service and by this SDK.
pub mod code {
    pub const AUTHENTICATION_FAILED: &str = "AUTHENTICATION_FAILED";
    pub const AUTHORIZATION_FAILED: &str = "AUTHORIZATION_FAILED";
    pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";
    pub const TOTP_REQUIRED: &str = "TOTP_REQUIRED";
    pub const DEVICE_NOT_AVAILABLE: &str = "DEVICE_NOT_AVAILABLE";
    pub const INVALID_INPUT: &str = "INVALID_INPUT";
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const SERVER_ERROR: &str = "SERVER_ERROR";
    pub const MFA_REQUIRED: &str = "MFA_REQUIRED";
    pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
}

/// Error payload returned by the identity service for a failed request.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct ApiError {
    /// HTTP status of the response.
    pub status: u16,
    /// Service error code (`code` field of the body).
    pub code: String,
    /// Human readable message (`message`, falling back to `error`).
    pub message: String,
    /// Value of the `x-request-id` response header, if any.
    pub request_id: Option<String>,
    /// Full response body.
    pub details: JsonValue,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(request_id) = &self.request_id {
            write!(f, " (request id: {request_id})")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("authentication failed: {0}")]
    Authentication(ApiError),

    #[error("authorization failed: {0}")]
    Authorization(ApiError),

    #[error("session expired: {0}")]
    SessionExpired(ApiError),

    #[error("TOTP verification required: {0}")]
    TotpRequired(ApiError),

    #[error("device not available: {0}")]
    DeviceNotAvailable(ApiError),

    #[error("invalid input: {0}")]
    InvalidInput(ApiError),

    /// 5xx response, raised once retries are exhausted.
    #[error("server error: {0}")]
    Server(ApiError),

    /// Any other non-success response (404, 409, 429, ...).
    #[error("request failed: {0}")]
    Api(ApiError),

    /// Connectivity failure, raised once retries are exhausted.
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("configuration error: {0}")]
    Config(String),

    /// Raised by the server-side authentication core.
    #[error("not authenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("MFA verification required")]
    MfaRequired,
}

impl Error {
    /// Build the error matching a failed response.
    ///
    /// A recognized `code` in the body selects the kind regardless of the
    /// status; otherwise the status does.
    pub(crate) fn from_response(status: u16, body: &JsonValue, request_id: Option<String>) -> Self {
        let message = body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(JsonValue::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        let body_code = body.get("code").and_then(JsonValue::as_str);

        let make = |default_code: &str| ApiError {
            status,
            code: body_code.unwrap_or(default_code).to_string(),
            message: message.clone(),
            request_id: request_id.clone(),
            details: body.clone(),
        };

        match (body_code, status) {
            (Some(code::TOTP_REQUIRED), _) => Self::TotpRequired(make(code::TOTP_REQUIRED)),
            (Some(code::SESSION_EXPIRED), _) => Self::SessionExpired(make(code::SESSION_EXPIRED)),
            (Some(code::DEVICE_NOT_AVAILABLE), _) => {
                Self::DeviceNotAvailable(make(code::DEVICE_NOT_AVAILABLE))
            }
            (_, 400) => Self::InvalidInput(make(code::INVALID_INPUT)),
            (_, 401) => Self::Authentication(make(code::AUTHENTICATION_FAILED)),
            (_, 403) => Self::Authorization(make(code::AUTHORIZATION_FAILED)),
            (_, s) if s >= 500 => Self::Server(make(code::SERVER_ERROR)),
            _ => Self::Api(make(code::UNKNOWN_ERROR)),
        }
    }

    /// The service error payload, for errors produced from a response.
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Authentication(e)
            | Self::Authorization(e)
            | Self::SessionExpired(e)
            | Self::TotpRequired(e)
            | Self::DeviceNotAvailable(e)
            | Self::InvalidInput(e)
            | Self::Server(e)
            | Self::Api(e) => Some(e),
            _ => None,
        }
    }

    /// Stable error code string.
    #[must_use]
    pub fn code(&self) -> &str {
        if let Some(api) = self.api_error() {
            return &api.code;
        }
        match self {
            Self::Network(_) => code::NETWORK_ERROR,
            Self::Unauthenticated(_) => code::AUTHENTICATION_FAILED,
            Self::Forbidden(_) => code::AUTHORIZATION_FAILED,
            Self::MfaRequired => code::MFA_REQUIRED,
            _ => code::UNKNOWN_ERROR,
        }
    }

    /// HTTP status of the failed response, if the error came from one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.api_error().map(|e| e.status)
    }
}
