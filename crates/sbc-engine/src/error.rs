//! Container engine error types.

use thiserror::Error;

/// Result type alias for container engine calls.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("container engine connection failed: {0}")]
    Connection(String),

    #[error("no such object: {0}")]
    NotFound(String),

    #[error("container engine API error: {0}")]
    Api(bollard::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("container operation failed: {0}")]
    Operation(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(e: bollard::errors::Error) -> Self {
        match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => EngineError::NotFound(message),
            other => EngineError::Api(other),
        }
    }
}
