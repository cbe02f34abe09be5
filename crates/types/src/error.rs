use thiserror::Error;

/// Errors reported by a chain-state collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Requested entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entry already exists and may not be overwritten
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Amount string could not be parsed or is out of range
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Requested transition is not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Backend failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Shared result type for chain-state operations
pub type StateResult<T> = Result<T, StateError>;
