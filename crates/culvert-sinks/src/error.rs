//! Sink manager error types.

use thiserror::Error;

/// Result type alias for sink manager operations.
pub type SinkResult<T> = Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("sink already exists")]
    SinkAlreadyExists,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("sink not found: {0}")]
    SinkNotFound(String),

    #[error("sink unreachable: {0}")]
    SinkUnreachable(String),

    #[error("task delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("result not found: {0}")]
    ResultNotFound(String),

    #[error("token error: {0}")]
    Token(String),

    #[error(transparent)]
    State(#[from] culvert_state::StateError),
}
