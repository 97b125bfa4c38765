use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::types::ErrorBody;
use service::errors::{ServiceError, MISSING_PARAMETERS};
use thiserror::Error;
use tracing::{debug, warn};

/// Error returned by every handler. The body carries only `status` and a
/// client-safe message. Service failures were already logged by the service
/// layer, so `service` only leaves a debug breadcrumb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub op: &'static str,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(op: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        Self { op, body: ErrorBody::new(status.as_u16(), message) }
    }

    /// Controller-side presence failure; the service is never called.
    pub fn missing(op: &'static str, fields: &[&str]) -> Self {
        warn!(op, missing = ?fields, "request_missing_parameters");
        Self::new(op, StatusCode::BAD_REQUEST, MISSING_PARAMETERS)
    }

    pub fn bad_request(op: &'static str, detail: impl std::fmt::Display) -> Self {
        warn!(op, error = %detail, "request_rejected");
        Self::new(op, StatusCode::BAD_REQUEST, "Invalid parameters")
    }

    /// Negotiate a service failure into a response.
    pub fn service(op: &'static str, err: ServiceError) -> Self {
        debug!(op, status = err.status(), kind = err.kind().as_str(), "request_failed");
        Self { op, body: err.to_body() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("encryption key rejected: {0}")]
    Cipher(#[from] common::crypto::CipherError),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::errors::ModelError;

    #[test]
    fn upstream_detail_is_not_rendered() {
        let err = ApiError::service("sessions.list", ServiceError::from(ModelError::Db("relation \"x\" does not exist".into())));
        assert_eq!(err.body.status, 502);
        assert!(!err.body.message.contains("relation"));
    }

    #[test]
    fn missing_uses_generic_message() {
        let err = ApiError::missing("sessions.list", &["coach_id"]);
        assert_eq!(err.body, ErrorBody::new(400, "Missing required parameters"));
    }
}
