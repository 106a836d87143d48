//! Error types for the SBC state store.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("required field not defined: {0}")]
    MissingField(&'static str),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("state store unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("corrupt value in {table}.{column}: {value}")]
    Corrupt {
        table: &'static str,
        column: &'static str,
        value: String,
    },

    #[error("port range exhausted for {table}.{column}: next value would be {next}")]
    PortExhausted {
        table: &'static str,
        column: &'static str,
        next: i64,
    },

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<rusqlite::Error> for StateError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                StateError::Constraint(e.to_string())
            }
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::CannotOpen
                        | ErrorCode::DatabaseBusy
                        | ErrorCode::DatabaseLocked
                        | ErrorCode::PermissionDenied
                ) =>
            {
                StateError::Unavailable(e.to_string())
            }
            _ => StateError::Storage(e.to_string()),
        }
    }
}
