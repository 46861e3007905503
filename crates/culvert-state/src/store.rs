//! StateStore — redb-backed persistence for the control plane.
//!
//! Typed CRUD over users, functions, executions, sinks, tasks, task
//! results, and the compiler's object tables (requests, artifacts,
//! metadata). Rows are JSON-serialized into redb's `&[u8]` value
//! columns; artifacts are stored as raw bytes. The store supports both
//! on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use culvert_core::{CompilationRequest, FunctionMetadata};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [
            USERS,
            LAMBDAS,
            EXECUTIONS,
            SINKS,
            TASKS,
            TASK_RESULTS,
            COMPILE_REQUESTS,
            ARTIFACTS,
            FUNCTION_META,
        ] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic row plumbing ───────────────────────────────────────

    fn put_json<T: Serialize>(
        &self,
        table: RowTable,
        key: &str,
        row: &T,
    ) -> StateResult<()> {
        let value = serde_json::to_vec(row).map_err(map_err!(Serialize))?;
        self.put_bytes(table, key, &value)
    }

    fn put_bytes(
        &self,
        table: RowTable,
        key: &str,
        value: &[u8],
    ) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            t.insert(key, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        table: RowTable,
        key: &str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let row = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn list_json<T: DeserializeOwned>(
        &self,
        table: RowTable,
    ) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut rows = Vec::new();
        for entry in t.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            rows.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(rows)
    }

    /// Delete a row by key. Returns true if it existed.
    fn delete_key(&self, table: RowTable, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            existed = t.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Users ──────────────────────────────────────────────────────

    pub fn put_user(&self, user: &User) -> StateResult<()> {
        self.put_json(USERS, &user.id, user)
    }

    pub fn get_user(&self, user_id: &str) -> StateResult<Option<User>> {
        self.get_json(USERS, user_id)
    }

    /// Username lookup by table scan; usernames are unique by contract.
    pub fn find_user_by_username(&self, username: &str) -> StateResult<Option<User>> {
        let users: Vec<User> = self.list_json(USERS)?;
        Ok(users.into_iter().find(|u| u.username == username))
    }

    // ── Lambdas ────────────────────────────────────────────────────

    pub fn put_lambda(&self, lambda: &Lambda) -> StateResult<()> {
        debug!(func_id = %lambda.id, status = ?lambda.status, "lambda stored");
        self.put_json(LAMBDAS, &lambda.id, lambda)
    }

    pub fn get_lambda(&self, func_id: &str) -> StateResult<Option<Lambda>> {
        self.get_json(LAMBDAS, func_id)
    }

    pub fn delete_lambda(&self, func_id: &str) -> StateResult<bool> {
        self.delete_key(LAMBDAS, func_id)
    }

    // ── Executions ─────────────────────────────────────────────────

    pub fn put_execution(&self, execution: &Execution) -> StateResult<()> {
        self.put_json(EXECUTIONS, &execution.id, execution)
    }

    pub fn get_execution(&self, execution_id: &str) -> StateResult<Option<Execution>> {
        self.get_json(EXECUTIONS, execution_id)
    }

    // ── Sinks ──────────────────────────────────────────────────────

    pub fn put_sink(&self, sink: &Sink) -> StateResult<()> {
        self.put_json(SINKS, &sink.id, sink)
    }

    pub fn get_sink(&self, sink_id: &str) -> StateResult<Option<Sink>> {
        self.get_json(SINKS, sink_id)
    }

    /// Email lookup by table scan; emails are unique by contract.
    pub fn find_sink_by_email(&self, email: &str) -> StateResult<Option<Sink>> {
        let sinks: Vec<Sink> = self.list_json(SINKS)?;
        Ok(sinks.into_iter().find(|s| s.email == email))
    }

    pub fn list_sinks(&self) -> StateResult<Vec<Sink>> {
        self.list_json(SINKS)
    }

    pub fn delete_sink(&self, sink_id: &str) -> StateResult<bool> {
        self.delete_key(SINKS, sink_id)
    }

    // ── Tasks ──────────────────────────────────────────────────────

    pub fn put_task(&self, task: &Task) -> StateResult<()> {
        self.put_json(TASKS, &task.execution_id, task)
    }

    pub fn get_task(&self, execution_id: &str) -> StateResult<Option<Task>> {
        self.get_json(TASKS, execution_id)
    }

    // ── Task results ───────────────────────────────────────────────

    pub fn put_task_result(&self, result: &TaskResult) -> StateResult<()> {
        self.put_json(TASK_RESULTS, &result.execution_id, result)
    }

    pub fn get_task_result(&self, execution_id: &str) -> StateResult<Option<TaskResult>> {
        self.get_json(TASK_RESULTS, execution_id)
    }

    // ── Compiler object tables ─────────────────────────────────────

    pub fn put_compile_request(&self, request: &CompilationRequest) -> StateResult<()> {
        self.put_json(COMPILE_REQUESTS, &request.func_id, request)
    }

    pub fn get_compile_request(&self, func_id: &str) -> StateResult<Option<CompilationRequest>> {
        self.get_json(COMPILE_REQUESTS, func_id)
    }

    pub fn delete_compile_request(&self, func_id: &str) -> StateResult<bool> {
        self.delete_key(COMPILE_REQUESTS, func_id)
    }

    /// Persist compiled WASM bytes under the function id.
    pub fn put_artifact(&self, func_id: &str, wasm: &[u8]) -> StateResult<()> {
        debug!(%func_id, size = wasm.len(), "artifact stored");
        self.put_bytes(ARTIFACTS, func_id, wasm)
    }

    pub fn get_artifact(&self, func_id: &str) -> StateResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(ARTIFACTS).map_err(map_err!(Table))?;
        match t.get(func_id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(guard.value().to_vec())),
            None => Ok(None),
        }
    }

    pub fn put_function_metadata(&self, meta: &FunctionMetadata) -> StateResult<()> {
        self.put_json(FUNCTION_META, &meta.lambda_ref, meta)
    }

    pub fn get_function_metadata(&self, func_id: &str) -> StateResult<Option<FunctionMetadata>> {
        self.get_json(FUNCTION_META, func_id)
    }
}
