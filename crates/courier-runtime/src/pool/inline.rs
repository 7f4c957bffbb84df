//! Pass-through pool.

use crate::pool::{Job, ThreadPool};

/// Runs every job inline on the submitting thread. Useful where the pool
/// interface is required but concurrency is not wanted, e.g. in tests and
/// single-threaded tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineThreadPool;

impl InlineThreadPool {
    /// Creates the pool. There is nothing to start or stop.
    pub fn new() -> Self {
        Self
    }
}

impl ThreadPool for InlineThreadPool {
    fn add(&self, job: Job) -> bool {
        job();
        true
    }

    fn len(&self) -> usize {
        0
    }
}
