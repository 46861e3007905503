//! Compiler error types.

use std::fmt;

use thiserror::Error;

/// The pipeline stage a build failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Validate,
    Build,
    Store,
    Trigger,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetch => "fetch",
            Stage::Validate => "validate",
            Stage::Build => "build",
            Stage::Store => "store",
            Stage::Trigger => "trigger",
        };
        f.write_str(s)
    }
}

/// A build failure, tagged with the function and the stage it died in.
///
/// Compilation is never retried automatically; the error is logged for
/// the operator and the worker moves on.
#[derive(Debug, Error)]
#[error("compilation of {func_id} failed at {stage} stage: {message}")]
pub struct CompileError {
    pub func_id: String,
    pub stage: Stage,
    pub message: String,
}

impl CompileError {
    pub fn new(func_id: &str, stage: Stage, source: impl fmt::Display) -> Self {
        Self {
            func_id: func_id.to_string(),
            stage,
            message: source.to_string(),
        }
    }
}

/// Errors from the build queue itself.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("build job already queued for function: {0}")]
    AlreadyQueued(String),
}
