use parley_types::relationship::TransitionError;
use thiserror::Error;

/// Errors raised by the store layer.
///
/// A message that exists but belongs to someone else is reported as
/// `NotFound`, so callers cannot discover other users' message ids.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidOperation(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<TransitionError> for StoreError {
    fn from(err: TransitionError) -> Self {
        if err.is_conflict() {
            StoreError::Conflict(err.to_string())
        } else {
            StoreError::InvalidOperation(err.to_string())
        }
    }
}

impl From<parley_types::pair::PairKeyError> for StoreError {
    fn from(err: parley_types::pair::PairKeyError) -> Self {
        StoreError::InvalidOperation(err.to_string())
    }
}
