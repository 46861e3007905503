//! Domain types shared across the control plane.
//!
//! The compiler, orchestrator, scheduler, and gateway all exchange these
//! types. Everything is serializable to JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Memory profile bounds for a stored function, in MB.
pub const MIN_MEMORY_MB: u32 = 64;
pub const MAX_MEMORY_MB: u32 = 4096;

/// Source language of a stored function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Runtime {
    Go,
    Rust,
    C,
    Cpp,
    Python,
    Javascript,
}

impl Runtime {
    /// Parse the wire form (`"c"`, `"rust"`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "go" => Some(Self::Go),
            "rust" => Some(Self::Rust),
            "c" => Some(Self::C),
            "cpp" => Some(Self::Cpp),
            "python" => Some(Self::Python),
            "javascript" => Some(Self::Javascript),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::Rust => "rust",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Python => "python",
            Self::Javascript => "javascript",
        }
    }
}

/// How a function is expected to be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    OnCommand,
    Periodic,
}

impl RunType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "on_command" => Some(Self::OnCommand),
            "periodic" => Some(Self::Periodic),
            _ => None,
        }
    }
}

/// Lifecycle status of a stored function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionStatus {
    Pending,
    Compiling,
    Compiled,
    Active,
    Failed,
}

/// A single source file inside a compilation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Relative path inside the build scratch directory.
    pub path: String,
    pub content: Vec<u8>,
}

/// What the gateway hands the compiler: everything needed to build one
/// function into a WASM artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationRequest {
    pub func_id: String,
    pub user_id: String,
    pub runtime: Runtime,
    pub source_files: Vec<SourceFile>,
    pub memory_mb: u32,
    pub timeout_secs: u64,
    /// Execute the function immediately after a successful build.
    pub run_immediate: bool,
}

impl CompilationRequest {
    /// Admission checks performed at the validate stage of the build.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.func_id.is_empty() {
            return Err(ValidationError::EmptyFuncId);
        }
        if self.source_files.is_empty() {
            return Err(ValidationError::NoSourceFiles);
        }
        Ok(())
    }
}

/// Metadata the compiler persists for a successfully built function.
///
/// The orchestrator reads this on activation and carries `max_ram_mb`
/// and `wasm_ref` into every job it submits to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetadata {
    pub lambda_ref: String,
    /// Key of the compiled artifact in the object table.
    pub wasm_ref: String,
    pub user_id: String,
    pub status: FunctionStatus,
    pub entry_point: String,
    /// Memory requirement in MB. Kept as an integer end to end.
    pub max_ram_mb: u32,
    pub timeout_secs: u64,
    pub trigger_immediate: bool,
}

/// Request-shape violations detected before any stateful work.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("function id cannot be empty")]
    EmptyFuncId,

    #[error("at least one source file is required")]
    NoSourceFiles,

    #[error("unsupported runtime: {0}")]
    BadRuntime(String),

    #[error("unsupported run type: {0}")]
    BadRunType(String),

    #[error("memory_mb {0} outside [{MIN_MEMORY_MB}, {MAX_MEMORY_MB}]")]
    MemoryOutOfRange(u32),
}
