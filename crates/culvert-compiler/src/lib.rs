//! culvert-compiler — the asynchronous build pipeline.
//!
//! The gateway parks build jobs in the [`BuildQueue`] (deduplicated by
//! function id); the single [`CompilerWorker`] drains it, turning
//! source blobs into WASM artifacts and activating each function once
//! its build lands.

mod build;
mod error;
mod queue;
mod worker;

pub use build::build_wasm;
pub use error::{CompileError, QueueError, Stage};
pub use queue::{BuildJob, BuildQueue};
pub use worker::{CompilerWorker, RunTrigger};
