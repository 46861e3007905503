//! Persisted domain types.
//!
//! Rows for users, functions, executions, sinks, tasks, and task
//! results. All types are JSON-serialized into redb `&[u8]` value
//! columns; each entity is keyed by the id of the component that owns
//! it, and cross-component handles are id strings only.

use culvert_core::{FunctionStatus, RunType, Runtime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A registered platform user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: u64,
}

// ── Lambda ────────────────────────────────────────────────────────

/// A stored function definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lambda {
    /// Caller-chosen function name, unique per user.
    pub id: String,
    pub user_id: String,
    /// Opaque source blob, base64-decoded once at ingress.
    pub source_code: Vec<u8>,
    pub runtime: Runtime,
    pub memory_mb: u32,
    pub run_type: RunType,
    /// Artifact reference; `Some` once the status has reached `Compiled`.
    pub wasm_ref: Option<String>,
    pub status: FunctionStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

// ── Execution ─────────────────────────────────────────────────────

/// Lifecycle of a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Status transitions are monotone; terminal states are immutable.
    pub fn can_transition(self, to: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match self {
            Pending => matches!(to, Running | Completed | Failed),
            Running => matches!(to, Completed | Failed),
            Completed | Failed => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A single invocation record, tracked by one id from ingress to result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Execution {
    pub id: String,
    pub lambda_id: String,
    /// Client-supplied correlator.
    pub reference_id: String,
    pub input: Map<String, Value>,
    pub status: ExecutionStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: u64,
    pub finished_at: Option<u64>,
}

// ── Sink ──────────────────────────────────────────────────────────

/// Liveness state of a worker node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkStatus {
    Online,
    Busy,
    Offline,
}

/// A registered worker node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sink {
    pub id: String,
    /// Login credential, unique across sinks.
    pub email: String,
    pub password_hash: String,
    pub endpoint: String,
    pub ram_available_mb: u32,
    pub storage_available_mb: u32,
    pub status: SinkStatus,
    pub last_heartbeat: u64,
    pub registered_at: u64,
}

// ── Task ──────────────────────────────────────────────────────────

/// Delivery state of a unit of work at a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Delivered,
    Running,
    Completed,
    Failed,
}

/// A unit of work in flight at a sink, keyed by execution id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub execution_id: String,
    pub lambda_id: String,
    pub wasm_ref: String,
    pub input: Map<String, Value>,
    pub sink_id: String,
    pub status: TaskStatus,
    pub created_at: u64,
    pub delivered_at: Option<u64>,
    pub completed_at: Option<u64>,
}

/// Terminal record for a finished task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub execution_id: String,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub success: bool,
    pub received_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_status_is_monotone() {
        use ExecutionStatus::*;
        assert!(Pending.can_transition(Running));
        assert!(Pending.can_transition(Failed));
        assert!(Running.can_transition(Completed));
        assert!(!Running.can_transition(Pending));
        assert!(!Completed.can_transition(Failed));
        assert!(!Failed.can_transition(Running));
    }

    #[test]
    fn terminal_states() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }
}
