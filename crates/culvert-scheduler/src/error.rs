//! Scheduler error types.

use thiserror::Error;

use crate::job::JobStatus;

/// Result type alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors that can occur inside the queue service.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job id cannot be empty")]
    EmptyJobId,

    #[error("function id cannot be empty")]
    EmptyFuncId,

    #[error("job requests no memory")]
    ZeroRamRequest,

    #[error("job already exists in queue: {0}")]
    DuplicateJob(String),

    #[error("invalid job status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("queue id cannot be empty")]
    EmptyQueueId,

    #[error("min_ram {min} exceeds max_ram {max}")]
    InvertedRange { min: u32, max: u32 },

    #[error("at least one of min_ram or max_ram must be positive")]
    ZeroRange,

    #[error("duplicate queue id: {0}")]
    DuplicateQueueId(String),

    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("queue bands overlap: {0} and {1}")]
    OverlappingBands(String, String),

    #[error("queue pool cannot be empty")]
    EmptyPool,
}
