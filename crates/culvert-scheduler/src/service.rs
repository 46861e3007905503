//! QueueService — enqueue, peek, and the claim protocol.
//!
//! All queue-set mutations are serialized by a single mutex so that a
//! claim (peek of every matching band followed by one pop) is atomic
//! with its index update. The pool structure itself is immutable after
//! startup.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::job::{Job, JobMetadata, JobStatus};
use crate::pool::QueuePool;

/// Direct-delivery seam implemented by the sink manager.
///
/// Installed after construction (`set_dispatcher`) because the sink
/// manager also calls back into the queue service to claim work; the
/// two are built with the back-pointer absent and wired afterwards.
#[async_trait]
pub trait DirectDispatcher: Send + Sync {
    /// The id of a sink currently believed to hold a warm instance of
    /// `func_id`, if any.
    async fn active_sink_for(&self, func_id: &str) -> Option<String>;

    /// Deliver a job straight to the named sink, bypassing the queues.
    async fn dispatch_direct(
        &self,
        sink_id: &str,
        job_id: &str,
        func_id: &str,
        metadata: &JobMetadata,
    ) -> anyhow::Result<()>;
}

/// A peeked queue head eligible for claiming.
#[derive(Debug, Clone)]
pub struct CandidateJob {
    pub job: Job,
    pub queue_id: String,
}

struct Inner {
    pool: QueuePool,
    /// job_id → queue_id for every job currently parked in a queue.
    job_index: HashMap<String, String>,
}

/// Pool of memory-banded FIFO queues plus the job index.
pub struct QueueService {
    inner: Mutex<Inner>,
    dispatcher: OnceLock<Arc<dyn DirectDispatcher>>,
}

impl QueueService {
    /// Service over the standard three-band pool.
    pub fn new() -> Self {
        Self::with_pool(QueuePool::standard())
    }

    pub fn with_pool(pool: QueuePool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pool,
                job_index: HashMap::new(),
            }),
            dispatcher: OnceLock::new(),
        }
    }

    /// Install the sink manager back-pointer. Second calls are ignored.
    pub fn set_dispatcher(&self, dispatcher: Arc<dyn DirectDispatcher>) {
        let _ = self.dispatcher.set(dispatcher);
    }

    /// Park a job in the band selected by its memory requirement.
    ///
    /// On any failure no partial state is left behind: the index is
    /// only updated after the queue accepted the job.
    pub fn enqueue(
        &self,
        job_id: &str,
        func_id: &str,
        metadata: JobMetadata,
    ) -> SchedulerResult<bool> {
        let mut job = Job::new(job_id, func_id, metadata)?;

        let mut inner = self.inner.lock();
        let queue_id = inner.pool.select_queue_id(job.metadata.max_ram_mb);
        job.update_status(JobStatus::Queued)?;
        let queue = inner
            .pool
            .get_mut(&queue_id)
            .ok_or_else(|| SchedulerError::QueueNotFound(queue_id.clone()))?;
        queue.add_job(job)?;
        inner.job_index.insert(job_id.to_string(), queue_id.clone());

        info!(%job_id, %func_id, %queue_id, "job enqueued");
        Ok(true)
    }

    /// Heads of every queue whose band contains `allowed_ram`, without
    /// popping. Ordering follows the fixed band order of the pool.
    pub fn candidate_jobs(&self, allowed_ram: u32) -> Vec<CandidateJob> {
        let inner = self.inner.lock();
        Self::candidates_locked(&inner, allowed_ram)
    }

    fn candidates_locked(inner: &Inner, allowed_ram: u32) -> Vec<CandidateJob> {
        inner
            .pool
            .iter()
            .filter(|q| q.resource_range.contains(allowed_ram))
            .filter_map(|q| {
                q.peek().map(|job| CandidateJob {
                    job: job.clone(),
                    queue_id: q.queue_id.clone(),
                })
            })
            .collect()
    }

    /// Pop the first candidate for a sink with `allowed_ram` capacity.
    ///
    /// Peek and pop happen under one lock acquisition, so two racing
    /// claims can never return the same job.
    pub fn claim_next_job(&self, allowed_ram: u32) -> Option<Job> {
        let mut inner = self.inner.lock();
        let candidate = Self::candidates_locked(&inner, allowed_ram).into_iter().next()?;

        let queue = inner.pool.get_mut(&candidate.queue_id)?;
        let mut job = queue.pop_job()?;
        inner.job_index.remove(&job.job_id);
        if let Err(e) = job.update_status(JobStatus::Pending) {
            warn!(job_id = %job.job_id, error = %e, "claimed job in unexpected state");
        }
        debug!(job_id = %job.job_id, queue_id = %candidate.queue_id, allowed_ram, "job claimed");
        Some(job)
    }

    /// Trigger-time shortcut: deliver straight to a warm sink when the
    /// sink manager knows one, otherwise park the job in a queue. A
    /// failed direct delivery falls back to enqueue — never both.
    pub async fn dispatch_or_enqueue(
        &self,
        job_id: &str,
        func_id: &str,
        metadata: JobMetadata,
    ) -> SchedulerResult<bool> {
        if let Some(dispatcher) = self.dispatcher.get() {
            if let Some(sink_id) = dispatcher.active_sink_for(func_id).await {
                match dispatcher
                    .dispatch_direct(&sink_id, job_id, func_id, &metadata)
                    .await
                {
                    Ok(()) => {
                        info!(%job_id, %func_id, %sink_id, "job dispatched directly");
                        return Ok(true);
                    }
                    Err(e) => {
                        warn!(%job_id, %sink_id, error = %e, "direct dispatch failed, enqueueing");
                    }
                }
            }
        }
        self.enqueue(job_id, func_id, metadata)
    }

    pub fn has_job(&self, job_id: &str) -> bool {
        self.inner.lock().job_index.contains_key(job_id)
    }

    /// (queue_id, depth) per band, for observability.
    pub fn queue_depths(&self) -> Vec<(String, usize)> {
        let inner = self.inner.lock();
        inner
            .pool
            .iter()
            .map(|q| (q.queue_id.clone(), q.len()))
            .collect()
    }
}

impl Default for QueueService {
    fn default() -> Self {
        Self::new()
    }
}
