//! The fixed pool of memory-band queues.

use crate::error::{SchedulerError, SchedulerResult};
use crate::queue::Queue;

/// All band queues, ordered by ascending `max_ram`.
///
/// The pool structure is immutable after startup; only the queues'
/// contents change. Keeping a sorted `Vec` makes band selection
/// deterministic for a fixed pool.
#[derive(Debug)]
pub struct QueuePool {
    queues: Vec<Queue>,
}

impl QueuePool {
    /// Build a pool, enforcing unique ids and non-overlapping bands.
    pub fn new(mut queues: Vec<Queue>) -> SchedulerResult<Self> {
        if queues.is_empty() {
            return Err(SchedulerError::EmptyPool);
        }
        queues.sort_by(|a, b| {
            (a.resource_range.max_ram, a.queue_id.clone())
                .cmp(&(b.resource_range.max_ram, b.queue_id.clone()))
        });
        for pair in queues.windows(2) {
            if pair[0].queue_id == pair[1].queue_id {
                return Err(SchedulerError::DuplicateQueueId(pair[0].queue_id.clone()));
            }
            if pair[1].resource_range.min_ram <= pair[0].resource_range.max_ram {
                return Err(SchedulerError::OverlappingBands(
                    pair[0].queue_id.clone(),
                    pair[1].queue_id.clone(),
                ));
            }
        }
        Ok(Self { queues })
    }

    /// The standard three-band pool: [0,1024], [1025,4096], [4097,8192].
    pub fn standard() -> Self {
        let queues = vec![
            Queue::new("queue-1", 0, 1024).expect("static band"),
            Queue::new("queue-2", 1025, 4096).expect("static band"),
            Queue::new("queue-3", 4097, 8192).expect("static band"),
        ];
        Self { queues }
    }

    /// Queues in ascending band order.
    pub fn iter(&self) -> impl Iterator<Item = &Queue> {
        self.queues.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Queue> {
        self.queues.iter_mut()
    }

    pub fn get_mut(&mut self, queue_id: &str) -> Option<&mut Queue> {
        self.queues.iter_mut().find(|q| q.queue_id == queue_id)
    }

    /// The id of the smallest band whose `max_ram` covers the request;
    /// when the request exceeds every band, the largest band is used.
    pub fn select_queue_id(&self, max_ram_mb: u32) -> String {
        self.queues
            .iter()
            .find(|q| q.resource_range.max_ram >= max_ram_mb)
            .unwrap_or_else(|| self.queues.last().expect("pool is never empty"))
            .queue_id
            .clone()
    }
}
