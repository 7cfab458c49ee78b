//! Named FIFO queues in the shared queue store.
//!
//! Every agent consumes `queue:<agent>`; every task gets a one-shot reply
//! queue `queue:responses:<taskId>`. Tasks are never shared between agents.

pub mod introspect;
mod redis_store;

#[cfg(test)]
pub(crate) mod memory;

use crate::error::Result;
use std::time::Duration;

pub use redis_store::RedisQueueStore;

const TASK_QUEUE_PREFIX: &str = "queue:";
const RESPONSE_QUEUE_PREFIX: &str = "queue:responses:";

/// Queue an agent's worker consumes.
pub fn task_queue_key(agent: &str) -> String {
    format!("{}{}", TASK_QUEUE_PREFIX, agent)
}

/// Reply queue for one task.
pub fn response_queue_key(task_id: &str) -> String {
    format!("{}{}", RESPONSE_QUEUE_PREFIX, task_id)
}

/// Operations the crew needs from the queue store.
///
/// Implementations must be safe to share between threads. `push` appends at
/// the tail and `blocking_pop` removes from the head, so each key is FIFO.
pub trait QueueStore: Send + Sync {
    /// Round-trip check used by `up` and health probes.
    fn ping(&self) -> Result<()>;

    fn push(&self, key: &str, payload: &str) -> Result<()>;

    /// Remove and return the head of `key`, waiting up to `timeout`.
    /// `Ok(None)` means the wait timed out.
    fn blocking_pop(&self, key: &str, timeout: Duration) -> Result<Option<String>>;

    fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Number of entries waiting under `key`.
    fn depth(&self, key: &str) -> Result<usize>;

    /// Up to `count` entries from the head, without removing them.
    fn peek(&self, key: &str, count: usize) -> Result<Vec<String>>;

    /// Drop `key` entirely. Returns whether anything was removed.
    fn delete(&self, key: &str) -> Result<bool>;
}
