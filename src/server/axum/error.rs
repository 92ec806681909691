use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::{code, Error};

/// `401`/`403` with a `{ "error": code, "message": message }` body; any other
/// error is logged and answered with a generic `500`.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthenticated(_)
            | Self::MfaRequired
            | Self::Authentication(_)
            | Self::SessionExpired(_)
            | Self::TotpRequired(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::Authorization(_) => StatusCode::FORBIDDEN,
            _ => {
                tracing::error!(error = %self, "Auth internal error");
                let body = json!({
                    "error": code::SERVER_ERROR,
                    "message": "Internal error",
                });
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
        };

        let message = match &self {
            Self::Unauthenticated(msg) | Self::Forbidden(msg) => msg.clone(),
            Self::MfaRequired => "MFA verification required".to_string(),
            other => other
                .api_error()
                .map(|api| api.message.clone())
                .unwrap_or_else(|| other.to_string()),
        };
        let body = json!({
            "error": self.code(),
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
