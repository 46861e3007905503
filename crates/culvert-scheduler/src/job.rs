//! Scheduler-internal job wrapper around a triggered execution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{SchedulerError, SchedulerResult};

/// Lifecycle of a job inside the queue service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    New,
    Queued,
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    fn can_transition(self, to: JobStatus) -> bool {
        use JobStatus::*;
        match self {
            New => to == Queued,
            Queued => matches!(to, Pending | Failed),
            Pending => matches!(to, Running | Queued),
            Running => matches!(to, Done | Failed),
            Done | Failed => false,
        }
    }
}

/// Typed payload carried with a job from trigger to delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Memory requirement in MB; selects the queue band.
    pub max_ram_mb: u32,
    /// Artifact reference handed to the sink.
    pub wasm_ref: String,
    /// Caller-supplied invocation input.
    pub input: Map<String, Value>,
}

/// One triggered execution while it waits for, or holds, a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Same id as the execution record.
    pub job_id: String,
    pub func_id: String,
    pub status: JobStatus,
    pub metadata: JobMetadata,
    pub cycles_waited: u32,
}

impl Job {
    pub fn new(job_id: &str, func_id: &str, metadata: JobMetadata) -> SchedulerResult<Self> {
        if job_id.is_empty() {
            return Err(SchedulerError::EmptyJobId);
        }
        if func_id.is_empty() {
            return Err(SchedulerError::EmptyFuncId);
        }
        if metadata.max_ram_mb == 0 {
            return Err(SchedulerError::ZeroRamRequest);
        }
        Ok(Self {
            job_id: job_id.to_string(),
            func_id: func_id.to_string(),
            status: JobStatus::New,
            metadata,
            cycles_waited: 0,
        })
    }

    pub fn update_status(&mut self, to: JobStatus) -> SchedulerResult<()> {
        if !self.status.can_transition(to) {
            return Err(SchedulerError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn increment_wait(&mut self) {
        self.cycles_waited += 1;
    }

    pub fn reset_wait(&mut self) {
        self.cycles_waited = 0;
    }
}
