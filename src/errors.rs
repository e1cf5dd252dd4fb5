use thiserror::Error;

/// Errors reported while building forests and compiling evaluators.
///
/// Evaluation itself is total: once an evaluator is compiled it never fails
/// at eval time. `Internal` indicates a broken invariant inside the engine
/// and should be treated as a bug.
#[derive(Debug, Error)]
pub enum ForestError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ForestError>;

impl ForestError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        ForestError::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ForestError::Internal(msg.into())
    }
}
