use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Failure from the model layer. `Db` text is diagnostic only and must not
/// be shown to clients.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Db(String),
}

impl From<DbErr> for ModelError {
    fn from(e: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = e.sql_err() {
            return ModelError::Conflict(detail);
        }
        match e {
            DbErr::RecordNotFound(what) => ModelError::NotFound(what),
            other => ModelError::Db(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_not_found_maps_to_not_found() {
        let err: ModelError = DbErr::RecordNotFound("coach".into()).into();
        assert!(matches!(err, ModelError::NotFound(ref w) if w == "coach"));
    }

    #[test]
    fn other_errors_stay_db() {
        let err: ModelError = DbErr::Custom("boom".into()).into();
        assert!(matches!(err, ModelError::Db(_)));
    }
}
