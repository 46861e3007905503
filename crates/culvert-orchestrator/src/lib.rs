//! culvert-orchestrator — the set of activated functions.
//!
//! A function becomes *activated* once its build completed and the
//! gateway acknowledged it; only activated functions accept triggers.
//! On a trigger the orchestrator mints the job id (which doubles as
//! the execution id for the rest of the pipeline) and hands the job to
//! the queue service.
//!
//! The orchestrator and the gateway reference each other, so the
//! gateway back-pointer is installed after construction via
//! [`Orchestrator::set_gateway`]; nothing calls across the cycle
//! before wiring is complete.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use culvert_core::{FunctionMetadata, FunctionStatus};
use culvert_scheduler::{JobMetadata, QueueService};
use culvert_state::StateStore;

/// Result type alias for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("function metadata not found: {0}")]
    MetadataNotFound(String),

    #[error("function is not compiled: {0}")]
    NotCompiled(String),

    #[error("function not activated: {0}")]
    NotActivated(String),

    #[error("gateway not wired")]
    GatewayMissing,

    #[error("gateway call failed: {0}")]
    Gateway(String),

    #[error(transparent)]
    State(#[from] culvert_state::StateError),

    #[error(transparent)]
    Scheduler(#[from] culvert_scheduler::SchedulerError),
}

/// The gateway side of the activation handshake.
#[async_trait]
pub trait ActivationGateway: Send + Sync {
    async fn activate_job(&self, func_id: &str, user_id: &str) -> anyhow::Result<()>;
    async fn deactivate_job(&self, func_id: &str) -> anyhow::Result<()>;
}

/// Tracks activated functions and converts triggers into jobs.
pub struct Orchestrator {
    store: StateStore,
    scheduler: Arc<QueueService>,
    gateway: OnceLock<Arc<dyn ActivationGateway>>,
    /// Metadata snapshot per activated function.
    activated: RwLock<HashMap<String, FunctionMetadata>>,
    /// job_id → trigger correlator, for reconciliation and debugging.
    trigger_jobs: RwLock<HashMap<String, String>>,
}

impl Orchestrator {
    pub fn new(store: StateStore, scheduler: Arc<QueueService>) -> Self {
        Self {
            store,
            scheduler,
            gateway: OnceLock::new(),
            activated: RwLock::new(HashMap::new()),
            trigger_jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Install the gateway back-pointer. Second calls are ignored.
    pub fn set_gateway(&self, gateway: Arc<dyn ActivationGateway>) {
        let _ = self.gateway.set(gateway);
    }

    fn gateway(&self) -> OrchestratorResult<&Arc<dyn ActivationGateway>> {
        self.gateway.get().ok_or(OrchestratorError::GatewayMissing)
    }

    /// Admit a compiled function into the active set.
    ///
    /// Idempotent: re-activating refreshes the metadata snapshot.
    pub async fn activate_service(&self, func_id: &str) -> OrchestratorResult<()> {
        let meta = self
            .store
            .get_function_metadata(func_id)?
            .ok_or_else(|| OrchestratorError::MetadataNotFound(func_id.to_string()))?;

        if meta.status != FunctionStatus::Compiled {
            return Err(OrchestratorError::NotCompiled(func_id.to_string()));
        }

        self.gateway()?
            .activate_job(func_id, &meta.user_id)
            .await
            .map_err(|e| OrchestratorError::Gateway(e.to_string()))?;

        self.activated
            .write()
            .insert(func_id.to_string(), meta);
        info!(%func_id, "service activated");
        Ok(())
    }

    /// Remove a function from the active set.
    pub async fn deactivate_service(&self, func_id: &str) -> OrchestratorResult<()> {
        self.gateway()?
            .deactivate_job(func_id)
            .await
            .map_err(|e| OrchestratorError::Gateway(e.to_string()))?;

        self.activated.write().remove(func_id);
        info!(%func_id, "service deactivated");
        Ok(())
    }

    /// Convert a trigger into a scheduled job.
    ///
    /// Mints the job id — the same id identifies the execution from
    /// here to the sink's result report — and hands the job to the
    /// scheduler's dispatch-or-enqueue shortcut. Returns the job id.
    pub async fn receive_trigger(
        &self,
        trig_id: &str,
        func_id: &str,
        input: Map<String, Value>,
    ) -> OrchestratorResult<String> {
        let meta = self
            .activated
            .read()
            .get(func_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotActivated(func_id.to_string()))?;

        let job_id = culvert_core::new_id();
        self.trigger_jobs
            .write()
            .insert(job_id.clone(), trig_id.to_string());

        let metadata = JobMetadata {
            max_ram_mb: meta.max_ram_mb,
            wasm_ref: meta.wasm_ref.clone(),
            input,
        };
        self.scheduler
            .dispatch_or_enqueue(&job_id, func_id, metadata)
            .await?;

        info!(%func_id, %trig_id, %job_id, "trigger accepted");
        Ok(job_id)
    }

    pub fn is_activated(&self, func_id: &str) -> bool {
        self.activated.read().contains_key(func_id)
    }

    /// The trigger correlator recorded for a job, if any.
    pub fn trigger_for_job(&self, job_id: &str) -> Option<String> {
        self.trigger_jobs.read().get(job_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct RecordingGateway {
        activated: Mutex<Vec<String>>,
        deactivated: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingGateway {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                activated: Mutex::new(Vec::new()),
                deactivated: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl ActivationGateway for RecordingGateway {
        async fn activate_job(&self, func_id: &str, _user_id: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("gateway down");
            }
            self.activated.lock().push(func_id.to_string());
            Ok(())
        }

        async fn deactivate_job(&self, func_id: &str) -> anyhow::Result<()> {
            self.deactivated.lock().push(func_id.to_string());
            Ok(())
        }
    }

    fn compiled_meta(func_id: &str) -> FunctionMetadata {
        FunctionMetadata {
            lambda_ref: func_id.to_string(),
            wasm_ref: func_id.to_string(),
            user_id: "u1".to_string(),
            status: FunctionStatus::Compiled,
            entry_point: "_start".to_string(),
            max_ram_mb: 256,
            timeout_secs: 30,
            trigger_immediate: false,
        }
    }

    fn orchestrator() -> (Orchestrator, StateStore, Arc<QueueService>) {
        let store = StateStore::open_in_memory().unwrap();
        let scheduler = Arc::new(QueueService::new());
        let orch = Orchestrator::new(store.clone(), scheduler.clone());
        (orch, store, scheduler)
    }

    #[tokio::test]
    async fn activate_requires_compiled_metadata() {
        let (orch, store, _) = orchestrator();
        orch.set_gateway(RecordingGateway::new(false));

        // No metadata at all.
        assert!(matches!(
            orch.activate_service("adder").await,
            Err(OrchestratorError::MetadataNotFound(_))
        ));

        // Metadata present but not compiled.
        let mut meta = compiled_meta("adder");
        meta.status = FunctionStatus::Pending;
        store.put_function_metadata(&meta).unwrap();
        assert!(matches!(
            orch.activate_service("adder").await,
            Err(OrchestratorError::NotCompiled(_))
        ));
        assert!(!orch.is_activated("adder"));
    }

    #[tokio::test]
    async fn activate_notifies_gateway_and_records_snapshot() {
        let (orch, store, _) = orchestrator();
        let gateway = RecordingGateway::new(false);
        orch.set_gateway(gateway.clone());
        store.put_function_metadata(&compiled_meta("adder")).unwrap();

        orch.activate_service("adder").await.unwrap();
        assert!(orch.is_activated("adder"));
        assert_eq!(gateway.activated.lock().as_slice(), ["adder"]);

        // Idempotent re-activation.
        orch.activate_service("adder").await.unwrap();
        assert!(orch.is_activated("adder"));
    }

    #[tokio::test]
    async fn gateway_refusal_blocks_activation() {
        let (orch, store, _) = orchestrator();
        orch.set_gateway(RecordingGateway::new(true));
        store.put_function_metadata(&compiled_meta("adder")).unwrap();

        assert!(matches!(
            orch.activate_service("adder").await,
            Err(OrchestratorError::Gateway(_))
        ));
        assert!(!orch.is_activated("adder"));
    }

    #[tokio::test]
    async fn deactivate_removes_from_active_set() {
        let (orch, store, _) = orchestrator();
        let gateway = RecordingGateway::new(false);
        orch.set_gateway(gateway.clone());
        store.put_function_metadata(&compiled_meta("adder")).unwrap();

        orch.activate_service("adder").await.unwrap();
        orch.deactivate_service("adder").await.unwrap();
        assert!(!orch.is_activated("adder"));
        assert_eq!(gateway.deactivated.lock().as_slice(), ["adder"]);
    }

    #[tokio::test]
    async fn trigger_requires_activation() {
        let (orch, _, _) = orchestrator();
        orch.set_gateway(RecordingGateway::new(false));

        let err = orch
            .receive_trigger("t1", "adder", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::NotActivated(_)));
    }

    #[tokio::test]
    async fn trigger_enqueues_job_with_metadata() {
        let (orch, store, scheduler) = orchestrator();
        orch.set_gateway(RecordingGateway::new(false));
        store.put_function_metadata(&compiled_meta("adder")).unwrap();
        orch.activate_service("adder").await.unwrap();

        let mut input = Map::new();
        input.insert("a".to_string(), serde_json::json!(2));

        let job_id = orch.receive_trigger("t1", "adder", input).await.unwrap();
        assert!(scheduler.has_job(&job_id));
        assert_eq!(orch.trigger_for_job(&job_id).as_deref(), Some("t1"));

        let job = scheduler.claim_next_job(512).unwrap();
        assert_eq!(job.job_id, job_id);
        assert_eq!(job.func_id, "adder");
        assert_eq!(job.metadata.max_ram_mb, 256);
        assert_eq!(job.metadata.wasm_ref, "adder");
    }

    #[tokio::test]
    async fn activation_without_wired_gateway_fails() {
        let (orch, store, _) = orchestrator();
        store.put_function_metadata(&compiled_meta("adder")).unwrap();
        assert!(matches!(
            orch.activate_service("adder").await,
            Err(OrchestratorError::GatewayMissing)
        ));
    }
}
