use thiserror::Error;

/// Errors raised while building a model or answering similarity queries.
/// All of them are deterministic functions of the input data, so callers
/// should not retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum B2vError {
    #[error("token '{0}' must contain the behavior-item separator exactly once")]
    InvalidTokenFormat(String),

    #[error("behavior '{0}' has no trained vectors to average")]
    EmptyBehavior(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("'{0}' was not part of the training vocabulary")]
    UnknownToken(String),

    #[error("model has not been trained")]
    NotTrained,

    #[error("requested {requested} neighbors but the index only holds {available} entries")]
    InsufficientNeighbors { requested: usize, available: usize },

    #[error("model persistence failed: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, B2vError>;
