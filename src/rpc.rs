//! Request/reply envelope for the auth message subjects.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::auth::errors::AuthError;

pub const AUTH_REGISTER: &str = "auth.register";
pub const AUTH_LOGIN: &str = "auth.login";
pub const AUTH_VERIFY_TOKEN: &str = "auth.verify.token";

/// HTTP path a subject is served on.
pub fn subject_path(subject: &str) -> String {
    format!("/rpc/{subject}")
}

/// Uniform failure reply: `{ "status": 400, "message": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcError {
    pub status: u16,
    pub message: String,
}

impl RpcError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST.as_u16(),
            message: message.into(),
        }
    }

    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: "Internal server error".into(),
        }
    }
}

/// Domain failures keep their message on a 400; store and internal faults
/// become an opaque 500.
impl From<AuthError> for RpcError {
    fn from(e: AuthError) -> Self {
        if e.is_domain() {
            RpcError::bad_request(e.to_string())
        } else {
            error!(error = %e, "request failed");
            RpcError::internal()
        }
    }
}

impl From<JsonRejection> for RpcError {
    fn from(rejection: JsonRejection) -> Self {
        RpcError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_REQUEST);
        (status, Json(self)).into_response()
    }
}
