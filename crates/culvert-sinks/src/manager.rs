//! SinkManager — registry, liveness, delivery, reconciliation.
//!
//! Sinks register with credentials, then announce capacity through
//! periodic heartbeats. Every heartbeat is an opportunity to drain the
//! scheduler: the manager claims a job sized to the announced RAM and
//! delivers it. Results flow back through `process_task_result`, which
//! frees the sink and immediately tries to hand it more work.
//!
//! Status machine: register → `offline`; heartbeat → `online`;
//! accepted delivery → `busy`; result received → `online`; heartbeat
//! silence past the stale threshold → `offline`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use culvert_core::{auth, epoch_secs, new_id};
use culvert_scheduler::{DirectDispatcher, JobMetadata, QueueService};
use culvert_state::{Sink, SinkStatus, StateStore, Task, TaskResult, TaskStatus};

use crate::client::{SinkClient, TaskDelivery};
use crate::error::{SinkError, SinkResult};

/// Fired after a task result is persisted; how the gateway learns of
/// completion. Invoked fire-and-forget on its own task.
pub type ResultCallback =
    Arc<dyn Fn(String, Option<Value>, Option<String>) -> BoxFuture + Send + Sync>;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSink {
    pub email: String,
    pub password: String,
    pub endpoint: String,
}

/// Pushed heartbeat body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkHeartbeat {
    pub sink_id: String,
    pub ram_available_mb: u32,
    pub storage_available_mb: u32,
}

/// Result report posted by a sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub execution_id: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub success: bool,
}

/// Heartbeat bounds, MB.
const MAX_RAM_MB: u32 = 65_536;
const MAX_STORAGE_MB: u32 = 1_048_576;

struct StaleTask {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the sink fleet.
pub struct SinkManager {
    store: StateStore,
    client: Arc<dyn SinkClient>,
    scheduler: Arc<QueueService>,
    jwt_secret: Vec<u8>,
    result_callback: OnceLock<ResultCallback>,
    /// func_id → sink last observed holding a warm instance of it.
    warm: RwLock<HashMap<String, String>>,
    stale: Mutex<Option<StaleTask>>,
}

impl SinkManager {
    pub fn new(
        store: StateStore,
        client: Arc<dyn SinkClient>,
        scheduler: Arc<QueueService>,
        jwt_secret: &[u8],
    ) -> Self {
        Self {
            store,
            client,
            scheduler,
            jwt_secret: jwt_secret.to_vec(),
            result_callback: OnceLock::new(),
            warm: RwLock::new(HashMap::new()),
            stale: Mutex::new(None),
        }
    }

    /// Install the completion callback. Second calls are ignored.
    pub fn set_result_callback(&self, callback: ResultCallback) {
        let _ = self.result_callback.set(callback);
    }

    // ── Registration & credentials ─────────────────────────────────

    /// Admit a new sink. Duplicate emails are rejected without side
    /// effects; the sink starts `offline` until its first heartbeat.
    pub fn register_sink(&self, req: &RegisterSink) -> SinkResult<String> {
        validate_register(req)?;

        if self.store.find_sink_by_email(&req.email)?.is_some() {
            return Err(SinkError::SinkAlreadyExists);
        }

        let now = epoch_secs();
        let sink = Sink {
            id: new_id(),
            email: req.email.clone(),
            password_hash: auth::hash_password(&req.password),
            endpoint: req.endpoint.trim_end_matches('/').to_string(),
            ram_available_mb: 0,
            storage_available_mb: 0,
            status: SinkStatus::Offline,
            last_heartbeat: now,
            registered_at: now,
        };
        self.store.put_sink(&sink)?;

        info!(sink_id = %sink.id, email = %sink.email, "sink registered");
        Ok(sink.id)
    }

    /// Exchange credentials for a bearer token. Returns (sink_id, token).
    pub fn login_sink(&self, email: &str, password: &str) -> SinkResult<(String, String)> {
        let sink = self
            .store
            .find_sink_by_email(email)?
            .ok_or(SinkError::InvalidCredentials)?;

        if !auth::verify_password(password, &sink.password_hash) {
            return Err(SinkError::InvalidCredentials);
        }

        let token = auth::sign_token(&self.jwt_secret, &sink.id, &sink.email)
            .map_err(|e| SinkError::Token(e.to_string()))?;
        Ok((sink.id, token))
    }

    pub fn unregister_sink(&self, sink_id: &str) -> SinkResult<()> {
        if self.store.get_sink(sink_id)?.is_none() {
            return Err(SinkError::SinkNotFound(sink_id.to_string()));
        }
        self.store.delete_sink(sink_id)?;
        self.warm.write().retain(|_, warm_sink| warm_sink != sink_id);
        info!(%sink_id, "sink unregistered");
        Ok(())
    }

    pub fn get_sink(&self, sink_id: &str) -> SinkResult<Sink> {
        self.store
            .get_sink(sink_id)?
            .ok_or_else(|| SinkError::SinkNotFound(sink_id.to_string()))
    }

    pub fn list_sinks(&self) -> SinkResult<Vec<Sink>> {
        Ok(self.store.list_sinks()?)
    }

    // ── Heartbeats & dispatch ──────────────────────────────────────

    /// Record a heartbeat: refresh capacity, mark the sink online, and
    /// asynchronously try to hand it work.
    pub async fn process_heartbeat(self: Arc<Self>, req: &SinkHeartbeat) -> SinkResult<()> {
        validate_heartbeat(req)?;

        let mut sink = self
            .store
            .get_sink(&req.sink_id)?
            .ok_or_else(|| SinkError::SinkNotFound(req.sink_id.clone()))?;

        sink.ram_available_mb = req.ram_available_mb;
        sink.storage_available_mb = req.storage_available_mb;
        sink.status = SinkStatus::Online;
        sink.last_heartbeat = epoch_secs();
        self.store.put_sink(&sink)?;
        debug!(sink_id = %sink.id, ram = sink.ram_available_mb, "heartbeat received");

        tokio::spawn(async move {
            self.try_dispatch_to_sink(sink).await;
        });

        Ok(())
    }

    /// Opportunistic dispatch: claim a job sized to the sink's
    /// announced capacity and deliver it. A claimed job whose delivery
    /// fails is not re-queued; recovery is by timeout at the caller.
    pub async fn try_dispatch_to_sink(&self, sink: Sink) {
        if sink.status != SinkStatus::Online {
            return;
        }

        let Some(job) = self.scheduler.claim_next_job(sink.ram_available_mb) else {
            return;
        };

        let task = Task {
            execution_id: job.job_id,
            lambda_id: job.func_id,
            wasm_ref: job.metadata.wasm_ref,
            input: job.metadata.input,
            sink_id: sink.id.clone(),
            status: TaskStatus::Pending,
            created_at: epoch_secs(),
            delivered_at: None,
            completed_at: None,
        };

        if let Err(e) = self.deliver_task(task).await {
            warn!(sink_id = %sink.id, error = %e, "opportunistic dispatch failed");
        }
    }

    /// Deliver one task to its assigned sink.
    ///
    /// On success the task is persisted `delivered` and the sink
    /// `busy`, both visible to subsequent readers. On any failure the
    /// task ends `failed` and the sink keeps its previous status.
    pub async fn deliver_task(&self, mut task: Task) -> SinkResult<()> {
        if task.sink_id.is_empty() {
            return Err(SinkError::Invalid("task has no sink assigned".to_string()));
        }

        let mut sink = self
            .store
            .get_sink(&task.sink_id)?
            .ok_or_else(|| SinkError::SinkNotFound(task.sink_id.clone()))?;

        if sink.status == SinkStatus::Offline {
            return Err(SinkError::SinkUnreachable(sink.id));
        }

        task.status = TaskStatus::Pending;
        self.store.put_task(&task)?;

        let delivery = TaskDelivery {
            execution_id: task.execution_id.clone(),
            wasm_ref: task.wasm_ref.clone(),
            input: task.input.clone(),
        };

        let reply = match self.client.deliver_task(&sink.endpoint, &delivery).await {
            Ok(reply) => reply,
            Err(e) => {
                task.status = TaskStatus::Failed;
                if let Err(persist) = self.store.put_task(&task) {
                    warn!(execution_id = %task.execution_id, error = %persist, "failed to persist task failure");
                }
                return Err(SinkError::DeliveryFailed(e.to_string()));
            }
        };

        if !reply.accepted {
            task.status = TaskStatus::Failed;
            if let Err(persist) = self.store.put_task(&task) {
                warn!(execution_id = %task.execution_id, error = %persist, "failed to persist task failure");
            }
            let reason = reply
                .message
                .unwrap_or_else(|| "sink rejected task".to_string());
            return Err(SinkError::DeliveryFailed(reason));
        }

        task.status = TaskStatus::Delivered;
        task.delivered_at = Some(epoch_secs());
        self.store.put_task(&task)?;

        sink.status = SinkStatus::Busy;
        self.store.put_sink(&sink)?;

        self.warm
            .write()
            .insert(task.lambda_id.clone(), sink.id.clone());

        info!(execution_id = %task.execution_id, sink_id = %sink.id, "task delivered");
        Ok(())
    }

    // ── Results ────────────────────────────────────────────────────

    /// Ingest a result report from a sink.
    ///
    /// The `TaskResult` row is persisted before the completion
    /// callback fires; freeing the sink and re-dispatching are
    /// best-effort and logged only.
    pub async fn process_task_result(self: Arc<Self>, report: &TaskReport) -> SinkResult<()> {
        if report.execution_id.is_empty() {
            return Err(SinkError::Invalid("execution_id is required".to_string()));
        }

        let mut task = self
            .store
            .get_task(&report.execution_id)?
            .ok_or_else(|| SinkError::ResultNotFound(report.execution_id.clone()))?;

        let now = epoch_secs();
        task.status = if report.success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        task.completed_at = Some(now);
        self.store.put_task(&task)?;

        self.store.put_task_result(&TaskResult {
            execution_id: report.execution_id.clone(),
            output: report.output.clone(),
            error: report.error.clone(),
            success: report.success,
            received_at: now,
        })?;

        // Free the sink and immediately look for more work for it.
        if !task.sink_id.is_empty() {
            match self.store.get_sink(&task.sink_id) {
                Ok(Some(mut sink)) => {
                    sink.status = SinkStatus::Online;
                    if let Err(e) = self.store.put_sink(&sink) {
                        warn!(sink_id = %sink.id, error = %e, "failed to mark sink online");
                    } else {
                        let manager = Arc::clone(&self);
                        tokio::spawn(async move {
                            manager.try_dispatch_to_sink(sink).await;
                        });
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(sink_id = %task.sink_id, error = %e, "sink lookup after result failed"),
            }
        }

        if let Some(callback) = self.result_callback.get() {
            let error = if report.success {
                None
            } else {
                Some(
                    report
                        .error
                        .clone()
                        .unwrap_or_else(|| "execution failed".to_string()),
                )
            };
            let fut = callback(report.execution_id.clone(), report.output.clone(), error);
            tokio::spawn(fut);
        }

        info!(execution_id = %report.execution_id, success = report.success, "task result recorded");
        Ok(())
    }

    pub fn get_task_result(&self, execution_id: &str) -> SinkResult<TaskResult> {
        self.store
            .get_task_result(execution_id)?
            .ok_or_else(|| SinkError::ResultNotFound(execution_id.to_string()))
    }

    // ── Stale detection ────────────────────────────────────────────

    /// Start the background sweep that takes silent sinks offline.
    /// Ticks every `threshold / 2`; idempotent while running.
    pub fn start_stale_detector(self: Arc<Self>, threshold: Duration) {
        let mut guard = self.stale.lock();
        if guard.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let tick = threshold / 2;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(tick) => {
                        manager.mark_stale_sinks_offline(threshold);
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("stale detector stopping");
                        break;
                    }
                }
            }
        });

        *guard = Some(StaleTask {
            shutdown_tx,
            handle,
        });
        info!(threshold_secs = threshold.as_secs(), "stale detector started");
    }

    /// Stop the sweep; returns only after the detector task has exited.
    pub async fn stop_stale_detector(&self) {
        let task = self.stale.lock().take();
        if let Some(task) = task {
            let _ = task.shutdown_tx.send(true);
            let _ = task.handle.await;
            info!("stale detector stopped");
        }
    }

    /// One sweep: any non-offline sink whose heartbeat age exceeds the
    /// threshold goes offline. In-flight tasks are left untouched.
    pub fn mark_stale_sinks_offline(&self, threshold: Duration) {
        let sinks = match self.store.list_sinks() {
            Ok(sinks) => sinks,
            Err(e) => {
                warn!(error = %e, "stale sweep could not list sinks");
                return;
            }
        };

        let now = epoch_secs();
        for mut sink in sinks {
            if sink.status == SinkStatus::Offline {
                continue;
            }
            if now.saturating_sub(sink.last_heartbeat) > threshold.as_secs() {
                sink.status = SinkStatus::Offline;
                if let Err(e) = self.store.put_sink(&sink) {
                    warn!(sink_id = %sink.id, error = %e, "failed to mark sink offline");
                } else {
                    warn!(sink_id = %sink.id, "sink went stale");
                }
            }
        }
    }
}

#[async_trait]
impl DirectDispatcher for SinkManager {
    async fn active_sink_for(&self, func_id: &str) -> Option<String> {
        let sink_id = self.warm.read().get(func_id).cloned()?;
        match self.store.get_sink(&sink_id) {
            Ok(Some(sink)) if sink.status == SinkStatus::Online => Some(sink_id),
            _ => None,
        }
    }

    async fn dispatch_direct(
        &self,
        sink_id: &str,
        job_id: &str,
        func_id: &str,
        metadata: &JobMetadata,
    ) -> anyhow::Result<()> {
        let task = Task {
            execution_id: job_id.to_string(),
            lambda_id: func_id.to_string(),
            wasm_ref: metadata.wasm_ref.clone(),
            input: metadata.input.clone(),
            sink_id: sink_id.to_string(),
            status: TaskStatus::Pending,
            created_at: epoch_secs(),
            delivered_at: None,
            completed_at: None,
        };
        self.deliver_task(task).await?;
        Ok(())
    }
}

fn validate_register(req: &RegisterSink) -> SinkResult<()> {
    if !req.email.contains('@') {
        return Err(SinkError::Invalid("email is not valid".to_string()));
    }
    if req.password.len() < 7 {
        return Err(SinkError::Invalid(
            "password must be at least 7 characters".to_string(),
        ));
    }
    if !req.endpoint.starts_with("http://") && !req.endpoint.starts_with("https://") {
        return Err(SinkError::Invalid(
            "endpoint must be an http(s) URL".to_string(),
        ));
    }
    Ok(())
}

fn validate_heartbeat(req: &SinkHeartbeat) -> SinkResult<()> {
    if req.sink_id.is_empty() {
        return Err(SinkError::Invalid("sink_id is required".to_string()));
    }
    if req.ram_available_mb > MAX_RAM_MB {
        return Err(SinkError::Invalid(format!(
            "ram_available_mb {} exceeds {MAX_RAM_MB}",
            req.ram_available_mb
        )));
    }
    if req.storage_available_mb > MAX_STORAGE_MB {
        return Err(SinkError::Invalid(format!(
            "storage_available_mb {} exceeds {MAX_STORAGE_MB}",
            req.storage_available_mb
        )));
    }
    Ok(())
}
