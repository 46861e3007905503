//! The compilation queue — a deduplicating FIFO with a blocking dequeue.
//!
//! At most one build job per function id can be present at any moment.
//! The single consumer (the compiler worker) parks on `dequeue` until a
//! producer signals.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::QueueError;

/// One pending build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildJob {
    pub func_id: String,
}

struct Inner {
    jobs: VecDeque<BuildJob>,
    queued: HashSet<String>,
}

/// Process-wide FIFO of pending builds.
pub struct BuildQueue {
    inner: Mutex<Inner>,
    signal: Notify,
}

impl BuildQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                jobs: VecDeque::new(),
                queued: HashSet::new(),
            }),
            signal: Notify::new(),
        }
    }

    /// Append a build job unless one for the same function is already
    /// present. Signals the waiting consumer on success.
    pub fn add_job(&self, func_id: &str) -> Result<(), QueueError> {
        {
            let mut inner = self.inner.lock();
            if !inner.queued.insert(func_id.to_string()) {
                return Err(QueueError::AlreadyQueued(func_id.to_string()));
            }
            inner.jobs.push_back(BuildJob {
                func_id: func_id.to_string(),
            });
        }
        self.signal.notify_one();
        Ok(())
    }

    /// Block until a job is present, then remove and return the head.
    ///
    /// One consumer at a time is assumed; a second consumer would need
    /// a broadcasting signal.
    pub async fn dequeue(&self) -> BuildJob {
        loop {
            // Register interest before checking, so a signal between the
            // check and the await is not lost.
            let notified = self.signal.notified();
            if let Some(job) = self.try_pop() {
                return job;
            }
            notified.await;
        }
    }

    fn try_pop(&self) -> Option<BuildJob> {
        let mut inner = self.inner.lock();
        let job = inner.jobs.pop_front()?;
        inner.queued.remove(&job.func_id);
        Some(job)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().jobs.is_empty()
    }

    pub fn contains(&self, func_id: &str) -> bool {
        self.inner.lock().queued.contains(func_id)
    }
}

impl Default for BuildQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn dequeue_preserves_insertion_order() {
        let queue = BuildQueue::new();
        queue.add_job("a").unwrap();
        queue.add_job("b").unwrap();
        queue.add_job("c").unwrap();

        assert_eq!(queue.dequeue().await.func_id, "a");
        assert_eq!(queue.dequeue().await.func_id, "b");
        assert_eq!(queue.dequeue().await.func_id, "c");
    }

    #[test]
    fn duplicate_job_rejected_without_growth() {
        let queue = BuildQueue::new();
        queue.add_job("x").unwrap();
        assert_eq!(
            queue.add_job("x"),
            Err(QueueError::AlreadyQueued("x".to_string()))
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn same_function_requeues_after_dequeue() {
        let queue = BuildQueue::new();
        queue.add_job("x").unwrap();
        assert!(queue.try_pop().is_some());
        assert!(!queue.contains("x"));
        queue.add_job("x").unwrap();
    }

    #[tokio::test]
    async fn dequeue_blocks_until_signalled() {
        let queue = Arc::new(BuildQueue::new());

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };

        // Give the consumer time to park.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        queue.add_job("late").unwrap();
        let job = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.func_id, "late");
    }

    #[tokio::test]
    async fn signal_before_dequeue_is_not_lost() {
        let queue = BuildQueue::new();
        queue.add_job("early").unwrap();
        let job = tokio::time::timeout(Duration::from_secs(1), queue.dequeue())
            .await
            .unwrap();
        assert_eq!(job.func_id, "early");
    }
}
