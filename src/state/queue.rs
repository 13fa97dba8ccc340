//! Single-writer queue for the state file.
//!
//! Every read-modify-write of the file of record runs as one operation on
//! this queue. Operations run one at a time in arrival order; the tokio mutex
//! hands out its lock FIFO, which gives the ordering for free.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Concurrency-1 FIFO executor for state mutations
#[derive(Debug, Default)]
pub struct WriteQueue {
    slot: Mutex<()>,
    completed: AtomicU64,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` once every previously enqueued operation has finished.
    pub async fn enqueue<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _slot = self.slot.lock().await;
        let result = op().await;
        self.completed.fetch_add(1, Ordering::Relaxed);
        result
    }

    /// Number of operations run so far
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}
