//! redb table definitions.
//!
//! Every table uses `&str` keys and `&[u8]` values (JSON-serialized
//! rows), except `ARTIFACTS` whose values are raw WASM bytes.

use redb::TableDefinition;

/// Shape shared by every table in the store.
pub(crate) type RowTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Users keyed by `{user_id}`.
pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Stored functions keyed by `{func_id}`.
pub const LAMBDAS: TableDefinition<&str, &[u8]> = TableDefinition::new("lambdas");

/// Invocation records keyed by `{execution_id}`.
pub const EXECUTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("executions");

/// Worker nodes keyed by `{sink_id}`.
pub const SINKS: TableDefinition<&str, &[u8]> = TableDefinition::new("sinks");

/// In-flight work keyed by `{execution_id}`.
pub const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

/// Terminal task records keyed by `{execution_id}`.
pub const TASK_RESULTS: TableDefinition<&str, &[u8]> = TableDefinition::new("task_results");

/// Pending build inputs keyed by `{func_id}`.
pub const COMPILE_REQUESTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("compile_requests");

/// Compiled WASM bytes keyed by `{func_id}`.
pub const ARTIFACTS: TableDefinition<&str, &[u8]> = TableDefinition::new("artifacts");

/// Compiler-written function metadata keyed by `{func_id}`.
pub const FUNCTION_META: TableDefinition<&str, &[u8]> = TableDefinition::new("function_meta");
