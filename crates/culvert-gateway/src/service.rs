//! LambdaService — function ingress, triggers, and execution reads.
//!
//! The service persists functions, parks build jobs on the compilation
//! queue, and converts trigger calls into scheduled executions through
//! the orchestrator. It also implements the orchestrator's activation
//! back-call and the compiler's immediate-run trigger, and is where
//! task results land to finish execution records.

use std::sync::{Arc, OnceLock};

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use culvert_compiler::{BuildQueue, QueueError, RunTrigger};
use culvert_core::{
    epoch_secs, CompilationRequest, FunctionStatus, RunType, Runtime, SourceFile, MAX_MEMORY_MB,
    MIN_MEMORY_MB,
};
use culvert_orchestrator::{ActivationGateway, Orchestrator};
use culvert_state::{Execution, ExecutionStatus, Lambda, StateStore};

use crate::error::{GatewayError, GatewayResult};

/// Ingress form of a function definition.
#[derive(Debug, Clone)]
pub struct StoreLambda {
    pub user_id: String,
    pub func_id: String,
    /// Base64-encoded source blob; decoded exactly once here.
    pub source_code: String,
    pub runtime: String,
    pub memory_mb: u32,
    pub run_type: String,
    pub run_immediate: bool,
    pub timeout_secs: Option<u64>,
}

/// What ingress returns for a stored function.
#[derive(Debug, Clone)]
pub struct StoreOutcome {
    pub id: String,
    pub name: String,
    pub wasm_ref: Option<String>,
    pub message: String,
}

/// What a trigger returns.
#[derive(Debug, Clone)]
pub struct TriggerOutcome {
    pub execution_id: String,
    pub status: ExecutionStatus,
}

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct LambdaService {
    store: StateStore,
    build_queue: Arc<BuildQueue>,
    /// Back-pointer across the gateway ↔ orchestrator cycle; installed
    /// after both sides exist.
    orchestrator: OnceLock<Arc<Orchestrator>>,
}

impl LambdaService {
    pub fn new(store: StateStore, build_queue: Arc<BuildQueue>) -> Self {
        Self {
            store,
            build_queue,
            orchestrator: OnceLock::new(),
        }
    }

    /// Install the orchestrator back-pointer. Second calls are ignored.
    pub fn set_orchestrator(&self, orchestrator: Arc<Orchestrator>) {
        let _ = self.orchestrator.set(orchestrator);
    }

    fn orchestrator(&self) -> GatewayResult<&Arc<Orchestrator>> {
        self.orchestrator
            .get()
            .ok_or_else(|| GatewayError::Internal("orchestrator not wired".to_string()))
    }

    /// Validate, persist, and queue a function for compilation.
    ///
    /// Resubmitting a function while its build job is still queued is
    /// accepted without duplicating the job.
    pub fn store_lambda(&self, req: &StoreLambda) -> GatewayResult<StoreOutcome> {
        if req.user_id.is_empty() {
            return Err(GatewayError::Validation("user_id is required".to_string()));
        }
        if req.func_id.is_empty() {
            return Err(GatewayError::Validation("func_id is required".to_string()));
        }
        let runtime = Runtime::parse(&req.runtime)
            .ok_or_else(|| GatewayError::Unprocessable(format!("unsupported runtime: {}", req.runtime)))?;
        let run_type = RunType::parse(&req.run_type)
            .ok_or_else(|| GatewayError::Unprocessable(format!("unsupported run_type: {}", req.run_type)))?;
        if req.memory_mb < MIN_MEMORY_MB || req.memory_mb > MAX_MEMORY_MB {
            return Err(GatewayError::Validation(format!(
                "memory_mb {} outside [{MIN_MEMORY_MB}, {MAX_MEMORY_MB}]",
                req.memory_mb
            )));
        }
        if req.source_code.is_empty() {
            return Err(GatewayError::Validation("source_code is required".to_string()));
        }
        let source = base64::engine::general_purpose::STANDARD
            .decode(&req.source_code)
            .map_err(|_| GatewayError::Validation("source_code is not valid base64".to_string()))?;

        let now = epoch_secs();
        let created_at = self
            .store
            .get_lambda(&req.func_id)?
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let lambda = Lambda {
            id: req.func_id.clone(),
            user_id: req.user_id.clone(),
            source_code: source.clone(),
            runtime,
            memory_mb: req.memory_mb,
            run_type,
            wasm_ref: None,
            status: FunctionStatus::Pending,
            created_at,
            updated_at: now,
        };
        self.store.put_lambda(&lambda)?;

        self.store.put_compile_request(&CompilationRequest {
            func_id: req.func_id.clone(),
            user_id: req.user_id.clone(),
            runtime,
            source_files: vec![SourceFile {
                path: default_entry_file(runtime).to_string(),
                content: source,
            }],
            memory_mb: req.memory_mb,
            timeout_secs: req.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            run_immediate: req.run_immediate,
        })?;

        let message = match self.build_queue.add_job(&req.func_id) {
            Ok(()) => "lambda stored; compilation queued",
            // The queued build will pick up the freshly stored request.
            Err(QueueError::AlreadyQueued(_)) => "lambda stored; compilation already queued",
        };

        info!(func_id = %req.func_id, user_id = %req.user_id, "lambda stored");
        Ok(StoreOutcome {
            id: lambda.id.clone(),
            name: lambda.id,
            wasm_ref: None,
            message: message.to_string(),
        })
    }

    pub fn get_lambda(&self, func_id: &str) -> GatewayResult<Lambda> {
        self.store
            .get_lambda(func_id)?
            .ok_or_else(|| GatewayError::NotFound(format!("lambda {func_id}")))
    }

    pub fn delete_lambda(&self, func_id: &str) -> GatewayResult<()> {
        if !self.store.delete_lambda(func_id)? {
            return Err(GatewayError::NotFound(format!("lambda {func_id}")));
        }
        let _ = self.store.delete_compile_request(func_id)?;
        Ok(())
    }

    /// Convert a trigger call into a scheduled execution.
    ///
    /// The job id minted by the orchestrator becomes the execution id;
    /// one id identifies the invocation from here to the sink's result.
    pub async fn trigger(
        &self,
        reference_id: &str,
        input: Map<String, Value>,
    ) -> GatewayResult<TriggerOutcome> {
        let lambda = self.get_lambda(reference_id)?;

        let execution_id = self
            .orchestrator()?
            .receive_trigger(reference_id, &lambda.id, input.clone())
            .await?;

        let execution = Execution {
            id: execution_id.clone(),
            lambda_id: lambda.id,
            reference_id: reference_id.to_string(),
            input,
            status: ExecutionStatus::Pending,
            output: None,
            error: None,
            started_at: epoch_secs(),
            finished_at: None,
        };
        self.store.put_execution(&execution)?;

        Ok(TriggerOutcome {
            execution_id,
            status: ExecutionStatus::Pending,
        })
    }

    /// Ask the orchestrator to (re-)activate a stored function.
    pub async fn activate(&self, reference_id: &str) -> GatewayResult<()> {
        let lambda = self.get_lambda(reference_id)?;
        self.orchestrator()?.activate_service(&lambda.id).await?;
        Ok(())
    }

    pub fn get_execution(&self, execution_id: &str) -> GatewayResult<Execution> {
        self.store
            .get_execution(execution_id)?
            .ok_or_else(|| GatewayError::NotFound(format!("execution {execution_id}")))
    }

    /// Completion callback installed into the sink manager.
    ///
    /// Terminal executions are immutable; repeated reports are no-ops.
    pub fn handle_result(&self, execution_id: &str, output: Option<Value>, error: Option<String>) {
        match self.store.get_execution(execution_id) {
            Ok(Some(mut execution)) => {
                let to = if error.is_none() {
                    ExecutionStatus::Completed
                } else {
                    ExecutionStatus::Failed
                };
                if !execution.status.can_transition(to) {
                    debug!(%execution_id, status = ?execution.status, "result for terminal execution ignored");
                    return;
                }
                execution.status = to;
                execution.output = output;
                execution.error = error;
                execution.finished_at = Some(epoch_secs());
                if let Err(e) = self.store.put_execution(&execution) {
                    error!(%execution_id, error = %e, "failed to persist execution result");
                } else {
                    info!(%execution_id, status = ?to, "execution finished");
                }
            }
            Ok(None) => warn!(%execution_id, "result for unknown execution"),
            Err(e) => error!(%execution_id, error = %e, "execution lookup failed"),
        }
    }
}

/// Conventional entry file name per runtime.
fn default_entry_file(runtime: Runtime) -> &'static str {
    match runtime {
        Runtime::Go => "main.go",
        Runtime::Rust => "main.rs",
        Runtime::C => "main.c",
        Runtime::Cpp => "main.cpp",
        Runtime::Python => "main.py",
        Runtime::Javascript => "main.js",
    }
}

#[async_trait]
impl ActivationGateway for LambdaService {
    async fn activate_job(&self, func_id: &str, user_id: &str) -> anyhow::Result<()> {
        let mut lambda = self
            .store
            .get_lambda(func_id)?
            .with_context(|| format!("lambda not found: {func_id}"))?;
        if lambda.user_id != user_id {
            anyhow::bail!("user mismatch for function {func_id}");
        }
        lambda.status = FunctionStatus::Active;
        lambda.updated_at = epoch_secs();
        self.store.put_lambda(&lambda)?;
        Ok(())
    }

    async fn deactivate_job(&self, func_id: &str) -> anyhow::Result<()> {
        if let Some(mut lambda) = self.store.get_lambda(func_id)? {
            if lambda.status == FunctionStatus::Active {
                lambda.status = FunctionStatus::Compiled;
                lambda.updated_at = epoch_secs();
                self.store.put_lambda(&lambda)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RunTrigger for LambdaService {
    /// Immediate-run hook for freshly built functions: activate first
    /// (idempotent), then trigger with an empty input.
    async fn trigger_run(&self, func_id: &str) -> anyhow::Result<()> {
        self.orchestrator()
            .map_err(anyhow::Error::from)?
            .activate_service(func_id)
            .await?;
        self.trigger(func_id, Map::new())
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use culvert_core::FunctionMetadata;
    use culvert_scheduler::QueueService;

    struct Stack {
        service: Arc<LambdaService>,
        orchestrator: Arc<Orchestrator>,
        scheduler: Arc<QueueService>,
        store: StateStore,
        queue: Arc<BuildQueue>,
    }

    fn stack() -> Stack {
        let store = StateStore::open_in_memory().unwrap();
        let scheduler = Arc::new(QueueService::new());
        let orchestrator = Arc::new(Orchestrator::new(store.clone(), scheduler.clone()));
        let queue = Arc::new(BuildQueue::new());
        let service = Arc::new(LambdaService::new(store.clone(), queue.clone()));
        service.set_orchestrator(orchestrator.clone());
        orchestrator.set_gateway(service.clone());
        Stack {
            service,
            orchestrator,
            scheduler,
            store,
            queue,
        }
    }

    fn store_request(func_id: &str) -> StoreLambda {
        StoreLambda {
            user_id: "u1".to_string(),
            func_id: func_id.to_string(),
            source_code: base64::engine::general_purpose::STANDARD
                .encode(b"int add(int a, int b) { return a + b; }"),
            runtime: "c".to_string(),
            memory_mb: 256,
            run_type: "on_command".to_string(),
            run_immediate: false,
            timeout_secs: None,
        }
    }

    /// Simulate a finished build so the function can be activated.
    fn mark_compiled(stack: &Stack, func_id: &str) {
        stack
            .store
            .put_function_metadata(&FunctionMetadata {
                lambda_ref: func_id.to_string(),
                wasm_ref: func_id.to_string(),
                user_id: "u1".to_string(),
                status: FunctionStatus::Compiled,
                entry_point: "_start".to_string(),
                max_ram_mb: 256,
                timeout_secs: 30,
                trigger_immediate: false,
            })
            .unwrap();
        let mut lambda = stack.store.get_lambda(func_id).unwrap().unwrap();
        lambda.status = FunctionStatus::Compiled;
        lambda.wasm_ref = Some(func_id.to_string());
        stack.store.put_lambda(&lambda).unwrap();
    }

    #[test]
    fn store_persists_lambda_and_queues_build() {
        let stack = stack();
        let outcome = stack.service.store_lambda(&store_request("adder")).unwrap();
        assert_eq!(outcome.id, "adder");
        assert!(outcome.wasm_ref.is_none());

        let lambda = stack.store.get_lambda("adder").unwrap().unwrap();
        assert_eq!(lambda.status, FunctionStatus::Pending);
        assert_eq!(lambda.source_code, b"int add(int a, int b) { return a + b; }");

        assert!(stack.store.get_compile_request("adder").unwrap().is_some());
        assert_eq!(stack.queue.len(), 1);
    }

    #[test]
    fn resubmission_does_not_duplicate_build_job() {
        let stack = stack();
        stack.service.store_lambda(&store_request("adder")).unwrap();
        let outcome = stack.service.store_lambda(&store_request("adder")).unwrap();

        assert!(outcome.message.contains("already queued"));
        assert_eq!(stack.queue.len(), 1);
    }

    #[test]
    fn store_validates_request_shape() {
        let stack = stack();

        let mut bad = store_request("adder");
        bad.runtime = "cobol".to_string();
        assert!(matches!(
            stack.service.store_lambda(&bad),
            Err(GatewayError::Unprocessable(_))
        ));

        bad = store_request("adder");
        bad.run_type = "cron".to_string();
        assert!(matches!(
            stack.service.store_lambda(&bad),
            Err(GatewayError::Unprocessable(_))
        ));

        bad = store_request("adder");
        bad.memory_mb = 32;
        assert!(matches!(
            stack.service.store_lambda(&bad),
            Err(GatewayError::Validation(_))
        ));

        bad = store_request("adder");
        bad.source_code = "!!! not base64 !!!".to_string();
        assert!(matches!(
            stack.service.store_lambda(&bad),
            Err(GatewayError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn trigger_requires_activation() {
        let stack = stack();
        stack.service.store_lambda(&store_request("adder")).unwrap();

        let err = stack
            .service
            .trigger("adder", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::TransientPeer(_)));
    }

    #[tokio::test]
    async fn trigger_creates_execution_and_job_with_one_id() {
        let stack = stack();
        stack.service.store_lambda(&store_request("adder")).unwrap();
        mark_compiled(&stack, "adder");
        stack.orchestrator.activate_service("adder").await.unwrap();

        let mut input = Map::new();
        input.insert("a".to_string(), serde_json::json!(2));
        let outcome = stack.service.trigger("adder", input).await.unwrap();

        let execution = stack.service.get_execution(&outcome.execution_id).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert_eq!(execution.lambda_id, "adder");
        assert!(stack.scheduler.has_job(&outcome.execution_id));
    }

    #[tokio::test]
    async fn activation_marks_lambda_active() {
        let stack = stack();
        stack.service.store_lambda(&store_request("adder")).unwrap();
        mark_compiled(&stack, "adder");

        stack.service.activate("adder").await.unwrap();
        let lambda = stack.store.get_lambda("adder").unwrap().unwrap();
        assert_eq!(lambda.status, FunctionStatus::Active);
        assert!(stack.orchestrator.is_activated("adder"));
    }

    #[tokio::test]
    async fn result_callback_finishes_execution_once() {
        let stack = stack();
        stack.service.store_lambda(&store_request("adder")).unwrap();
        mark_compiled(&stack, "adder");
        stack.orchestrator.activate_service("adder").await.unwrap();
        let outcome = stack.service.trigger("adder", Map::new()).await.unwrap();

        stack
            .service
            .handle_result(&outcome.execution_id, Some(serde_json::json!(5)), None);
        let execution = stack.service.get_execution(&outcome.execution_id).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.output, Some(serde_json::json!(5)));
        assert!(execution.finished_at.is_some());

        // Terminal states are immutable: a late failure report is ignored.
        stack
            .service
            .handle_result(&outcome.execution_id, None, Some("late".to_string()));
        let execution = stack.service.get_execution(&outcome.execution_id).unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.output, Some(serde_json::json!(5)));
    }

    #[test]
    fn get_missing_lambda_is_not_found() {
        let stack = stack();
        assert!(matches!(
            stack.service.get_lambda("ghost"),
            Err(GatewayError::NotFound(_))
        ));
        assert!(matches!(
            stack.service.get_execution("ghost"),
            Err(GatewayError::NotFound(_))
        ));
    }

    #[test]
    fn delete_removes_lambda_and_request() {
        let stack = stack();
        stack.service.store_lambda(&store_request("adder")).unwrap();

        stack.service.delete_lambda("adder").unwrap();
        assert!(stack.store.get_lambda("adder").unwrap().is_none());
        assert!(stack.store.get_compile_request("adder").unwrap().is_none());
        assert!(matches!(
            stack.service.delete_lambda("adder"),
            Err(GatewayError::NotFound(_))
        ));
    }
}
