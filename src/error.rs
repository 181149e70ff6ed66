use thiserror::Error;

/// Advanced location error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("Session already running")]
    AlreadyRunning,

    #[error("Session not running")]
    NotRunning,

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Invalid fix: {0}")]
    InvalidFix(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for library operations
pub type LResult<T> = Result<T, LocationError>;

impl LocationError {
    /// Errors caused by the caller's input rather than by the library itself
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            LocationError::InvalidFix(_) | LocationError::InvalidConfig(_)
        )
    }
}
