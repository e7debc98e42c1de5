use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Timeout, connection failure or a non-success status.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Decode error: {0}")]
    Decode(String),

    /// Filtered out by content-type, size or resolution criteria.
    #[error("Rejected: {0}")]
    Validation(String),

    #[error("Filesystem error: {0}")]
    Filesystem(String),

    #[error("Invalid input: {0}")]
    Input(String),
}

impl AppError {
    /// Validation failures mean "filtered out" and are not reported as failures.
    pub fn is_rejection(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
