use common::crypto::CipherError;
use common::types::ErrorBody;
use models::errors::ModelError;
use thiserror::Error;

pub const MISSING_PARAMETERS: &str = "Missing required parameters";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("missing required parameters: {}", .0.join(", "))]
    MissingParameter(Vec<String>),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Db(String),
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CipherError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used for status mapping and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingParameter,
    Validation,
    NotFound,
    Conflict,
    Upstream,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MissingParameter => "missing_parameter",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Internal => "internal",
        }
    }
}

impl ServiceError {
    pub fn not_found(entity: &str) -> Self { Self::NotFound(format!("{} not found", entity)) }

    pub fn missing<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::MissingParameter(names.into_iter().map(Into::into).collect())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::MissingParameter(_) => ErrorKind::MissingParameter,
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::Db(_) => ErrorKind::Upstream,
            ServiceError::Model(ModelError::Validation(_)) => ErrorKind::Validation,
            ServiceError::Model(ModelError::NotFound(_)) => ErrorKind::NotFound,
            ServiceError::Model(ModelError::Conflict(_)) => ErrorKind::Conflict,
            ServiceError::Model(ModelError::Db(_)) => ErrorKind::Upstream,
            ServiceError::Crypto(_) | ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> u16 {
        match self.kind() {
            ErrorKind::MissingParameter | ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Upstream => 502,
            ErrorKind::Internal => 500,
        }
    }

    /// Message safe to show a client; the full `Display` text is for logs only.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::MissingParameter(_) => MISSING_PARAMETERS.to_string(),
            ServiceError::Validation(msg) | ServiceError::Conflict(msg) => msg.clone(),
            ServiceError::Model(ModelError::Validation(msg)) => msg.clone(),
            ServiceError::NotFound(msg) => msg.clone(),
            ServiceError::Model(ModelError::NotFound(entity)) => format!("{entity} not found"),
            // constraint text names tables and columns
            ServiceError::Model(ModelError::Conflict(_)) => "Record already exists".to_string(),
            ServiceError::Db(_) | ServiceError::Model(ModelError::Db(_)) => "Upstream data error".to_string(),
            ServiceError::Crypto(_) | ServiceError::Internal(_) => "Internal error".to_string(),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.status(), self.public_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parameter_maps_to_generic_400() {
        let e = ServiceError::missing(["coach_id"]);
        assert_eq!(e.to_body(), ErrorBody::new(400, "Missing required parameters"));
        assert!(e.to_string().contains("coach_id"));
    }

    #[test]
    fn upstream_detail_stays_out_of_public_message() {
        let e = ServiceError::from(ModelError::Db("connection refused at 10.0.0.3".into()));
        assert_eq!(e.status(), 502);
        assert!(!e.public_message().contains("10.0.0.3"));
        assert!(e.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(ServiceError::not_found("coach").status(), 404);
        assert_eq!(ServiceError::Conflict("overlap".into()).status(), 409);
        assert_eq!(ServiceError::from(CipherError::Open).status(), 500);
        assert_eq!(ServiceError::from(ModelError::Validation("x".into())).kind(), ErrorKind::Validation);
    }

    #[test]
    fn unique_violation_is_a_409_without_constraint_detail() {
        let e = ServiceError::from(ModelError::Conflict("duplicate key value violates unique constraint \"coach_email_key\"".into()));
        assert_eq!(e.to_body(), ErrorBody::new(409, "Record already exists"));
    }
}
