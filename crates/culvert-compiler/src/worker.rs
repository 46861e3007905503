//! The compiler worker — single long-running consumer of the build queue.
//!
//! For each dequeued function id the worker fetches the compilation
//! request, builds the WASM artifact, persists artifact and metadata,
//! optionally fires the immediate-run trigger, and finally asks the
//! orchestrator to activate the service. Stage failures are logged and
//! the loop advances; nothing is retried automatically.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info};

use culvert_core::{epoch_secs, FunctionMetadata, FunctionStatus};
use culvert_orchestrator::Orchestrator;
use culvert_state::StateStore;

use crate::build;
use crate::error::{CompileError, Stage};
use crate::queue::BuildQueue;

/// Fired when a request asked for execution immediately after its build.
#[async_trait]
pub trait RunTrigger: Send + Sync {
    async fn trigger_run(&self, func_id: &str) -> anyhow::Result<()>;
}

/// Consumes the build queue until shutdown.
pub struct CompilerWorker {
    queue: Arc<BuildQueue>,
    store: StateStore,
    orchestrator: Arc<Orchestrator>,
    run_trigger: Option<Arc<dyn RunTrigger>>,
}

impl CompilerWorker {
    pub fn new(queue: Arc<BuildQueue>, store: StateStore, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            queue,
            store,
            orchestrator,
            run_trigger: None,
        }
    }

    /// Install the immediate-run trigger hook.
    pub fn with_run_trigger(mut self, trigger: Arc<dyn RunTrigger>) -> Self {
        self.run_trigger = Some(trigger);
        self
    }

    /// The worker loop. Returns when the shutdown signal fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("compiler worker started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("compiler worker stopping");
                    break;
                }
                job = self.queue.dequeue() => {
                    self.process(&job.func_id).await;
                }
            }
        }
    }

    async fn process(&self, func_id: &str) {
        info!(%func_id, "build job dequeued");
        match self.compile(func_id).await {
            Ok(wasm) => {
                info!(%func_id, size_bytes = wasm.len(), "compilation succeeded");
                // Activation failure does not re-enqueue the build; the
                // operator deletes and resubmits.
                if let Err(e) = self.orchestrator.activate_service(func_id).await {
                    error!(%func_id, error = %e, "activation after build failed");
                }
            }
            Err(e) => {
                error!(func_id = %e.func_id, stage = %e.stage, message = %e.message, "compilation failed");
            }
        }
    }

    /// Run all build stages for one function.
    pub async fn compile(&self, func_id: &str) -> Result<Vec<u8>, CompileError> {
        // ── fetch ──────────────────────────────────────────────────
        let request = self
            .store
            .get_compile_request(func_id)
            .map_err(|e| CompileError::new(func_id, Stage::Fetch, e))?
            .ok_or_else(|| {
                CompileError::new(func_id, Stage::Fetch, "compilation request not found")
            })?;

        // ── validate ───────────────────────────────────────────────
        request
            .validate()
            .map_err(|e| CompileError::new(func_id, Stage::Validate, e))?;

        // ── build ──────────────────────────────────────────────────
        // The external compiler blocks; keep it off the async workers.
        let build_request = request.clone();
        let wasm = tokio::task::spawn_blocking(move || build::build_wasm(&build_request))
            .await
            .map_err(|e| CompileError::new(func_id, Stage::Build, e))?
            .map_err(|e| CompileError::new(func_id, Stage::Build, format!("{e:#}")))?;

        // ── store artifact ─────────────────────────────────────────
        self.store
            .put_artifact(func_id, &wasm)
            .map_err(|e| CompileError::new(func_id, Stage::Store, e))?;

        // ── store metadata ─────────────────────────────────────────
        let meta = FunctionMetadata {
            lambda_ref: func_id.to_string(),
            wasm_ref: func_id.to_string(),
            user_id: request.user_id.clone(),
            status: FunctionStatus::Compiled,
            entry_point: "_start".to_string(),
            max_ram_mb: request.memory_mb,
            timeout_secs: request.timeout_secs,
            trigger_immediate: request.run_immediate,
        };
        self.store
            .put_function_metadata(&meta)
            .map_err(|e| CompileError::new(func_id, Stage::Store, e))?;

        if let Some(mut lambda) = self
            .store
            .get_lambda(func_id)
            .map_err(|e| CompileError::new(func_id, Stage::Store, e))?
        {
            lambda.wasm_ref = Some(func_id.to_string());
            lambda.status = FunctionStatus::Compiled;
            lambda.updated_at = epoch_secs();
            self.store
                .put_lambda(&lambda)
                .map_err(|e| CompileError::new(func_id, Stage::Store, e))?;
        }

        // ── trigger ────────────────────────────────────────────────
        if request.run_immediate {
            if let Some(trigger) = &self.run_trigger {
                trigger
                    .trigger_run(func_id)
                    .await
                    .map_err(|e| CompileError::new(func_id, Stage::Trigger, e))?;
            }
        }

        Ok(wasm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use culvert_core::{CompilationRequest, Runtime, SourceFile};
    use culvert_scheduler::QueueService;

    fn worker() -> (CompilerWorker, StateStore) {
        let store = StateStore::open_in_memory().unwrap();
        let scheduler = Arc::new(QueueService::new());
        let orchestrator = Arc::new(Orchestrator::new(store.clone(), scheduler));
        let queue = Arc::new(BuildQueue::new());
        (
            CompilerWorker::new(queue, store.clone(), orchestrator),
            store,
        )
    }

    fn rust_request(func_id: &str) -> CompilationRequest {
        CompilationRequest {
            func_id: func_id.to_string(),
            user_id: "u1".to_string(),
            runtime: Runtime::Rust,
            source_files: vec![SourceFile {
                path: "main.rs".to_string(),
                content: b"fn main() {}".to_vec(),
            }],
            memory_mb: 256,
            timeout_secs: 30,
            run_immediate: false,
        }
    }

    #[tokio::test]
    async fn missing_request_fails_at_fetch() {
        let (worker, _) = worker();
        let err = worker.compile("ghost").await.unwrap_err();
        assert_eq!(err.stage, Stage::Fetch);
        assert_eq!(err.func_id, "ghost");
    }

    #[tokio::test]
    async fn empty_sources_fail_at_validate() {
        let (worker, store) = worker();
        let mut req = rust_request("empty");
        req.source_files.clear();
        store.put_compile_request(&req).unwrap();

        let err = worker.compile("empty").await.unwrap_err();
        assert_eq!(err.stage, Stage::Validate);
    }

    #[tokio::test]
    async fn unimplemented_runtime_fails_at_build() {
        let (worker, store) = worker();
        store.put_compile_request(&rust_request("rusty")).unwrap();

        let err = worker.compile("rusty").await.unwrap_err();
        assert_eq!(err.stage, Stage::Build);
        assert!(err.message.contains("not implemented"));
        // Nothing was persisted for the failed build.
        assert!(store.get_artifact("rusty").unwrap().is_none());
        assert!(store.get_function_metadata("rusty").unwrap().is_none());
    }

    #[tokio::test]
    async fn worker_shuts_down_on_signal() {
        let (worker, _) = worker();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(worker.run(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
