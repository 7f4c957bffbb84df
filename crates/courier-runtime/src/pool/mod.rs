//! Thread pools with a uniform submit surface.
//!
//! Four shapes share one interface:
//! - [`FixedThreadPool`] — N workers over a FIFO queue, optionally bounded,
//!   with blocking or rejecting producers;
//! - [`AdaptiveThreadPool`] — no queue; a single hand-off slot, workers
//!   spawned on demand and retired after an idle timeout;
//! - [`InlineThreadPool`] — runs every job on the caller;
//! - [`SimpleThreadPool`] — picks fixed or adaptive from the requested
//!   thread count and routes per-worker lifecycle hooks.

mod adaptive;
mod fixed;
mod inline;
mod simple;

pub use adaptive::AdaptiveThreadPool;
pub use fixed::FixedThreadPool;
pub use inline::InlineThreadPool;
pub use simple::SimpleThreadPool;

use std::sync::Arc;

use crate::error::PoolError;
use crate::sync::atomic::AtomicCounter;
use crate::thread::set_current_thread_name;

/// A unit of work submitted to a pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Per-worker lifecycle hooks.
///
/// A pool owner that needs a resource on every worker thread (a database
/// handle, a scratch arena) installs these; `worker_started` runs on the
/// worker before its first job and `worker_stopping` after its last.
pub trait WorkerHooks: Send + Sync {
    /// Called on the worker thread before it takes any job.
    fn worker_started(&self) {}
    /// Called on the worker thread after its final job.
    fn worker_stopping(&self) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl WorkerHooks for NoHooks {}

/// Pool construction options.
#[derive(Debug, Clone, Default)]
pub struct PoolOptions {
    /// Producers block on a full bounded queue instead of being rejected.
    pub blocking: bool,
    /// Workers catch and log job panics instead of dying with them.
    pub catching: bool,
    /// Worker thread name, or name prefix when `enumerate_threads` is set.
    pub thread_name: Option<String>,
    /// Append a per-worker counter to `thread_name`.
    pub enumerate_threads: bool,
}

impl PoolOptions {
    /// Defaults: non-blocking producers, catching workers, unnamed threads.
    pub fn new() -> Self {
        Self {
            blocking: false,
            catching: true,
            thread_name: None,
            enumerate_threads: false,
        }
    }

    /// Sets whether producers block on a full queue.
    pub fn blocking(mut self, value: bool) -> Self {
        self.blocking = value;
        self
    }

    /// Sets whether workers swallow job panics.
    pub fn catching(mut self, value: bool) -> Self {
        self.catching = value;
        self
    }

    /// Names every worker thread identically.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self.enumerate_threads = false;
        self
    }

    /// Names worker threads `<prefix>0`, `<prefix>1`, ...
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = Some(prefix.into());
        self.enumerate_threads = true;
        self
    }
}

/// Applies the configured thread name on each worker.
pub(crate) struct ThreadNamer {
    name: Option<String>,
    enumerate: bool,
    index: AtomicCounter,
}

impl ThreadNamer {
    pub(crate) fn new(options: &PoolOptions) -> Self {
        Self {
            name: options.thread_name.clone(),
            enumerate: options.enumerate_threads,
            index: AtomicCounter::new(0),
        }
    }

    pub(crate) fn apply(&self) {
        if let Some(name) = &self.name {
            if self.enumerate {
                set_current_thread_name(&format!("{name}{}", self.index.fetch_inc()));
            } else {
                set_current_thread_name(name);
            }
        }
    }
}

/// Runs one job, honoring the pool's `catching` flag.
pub(crate) fn run_job(job: Job, catching: bool) {
    if catching {
        if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
            let error = crate::error::panic_failure(payload);
            tracing::error!(%error, "thread pool job panicked");
        }
    } else {
        job();
    }
}

/// The uniform submit surface.
pub trait ThreadPool: Send + Sync {
    /// Queues a job; returns false if the pool rejected it (stopped, or
    /// bounded and full in non-blocking mode).
    fn add(&self, job: Job) -> bool;

    /// Queue depth for queued pools; live worker count for the adaptive
    /// pool.
    fn len(&self) -> usize;

    /// Whether [`ThreadPool::len`] is zero.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Closure-accepting conveniences over any [`ThreadPool`].
pub trait ThreadPoolExt: ThreadPool {
    /// Queues a closure; returns false on rejection.
    fn add_fn<F: FnOnce() + Send + 'static>(&self, f: F) -> bool {
        self.add(Box::new(f))
    }

    /// Queues a closure; rejection is an error.
    fn safe_add_fn<F: FnOnce() + Send + 'static>(&self, f: F) -> Result<(), PoolError> {
        if self.add_fn(f) {
            Ok(())
        } else {
            Err(PoolError::Rejected)
        }
    }
}

impl<P: ThreadPool + ?Sized> ThreadPoolExt for P {}

/// Builds and starts a pool sized for `thread_count`: a fixed pool when more
/// than one worker is requested, the inline pool otherwise.
pub fn create_pool(
    thread_count: usize,
    queue_limit: usize,
    options: PoolOptions,
) -> Result<Box<dyn ThreadPool>, PoolError> {
    if thread_count > 1 {
        let mut pool = FixedThreadPool::new(options);
        pool.start(thread_count, queue_limit)?;
        Ok(Box::new(pool))
    } else {
        Ok(Box::new(InlineThreadPool::new()))
    }
}

pub(crate) type SharedHooks = Arc<dyn WorkerHooks>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PoolError;

    struct RejectingPool;

    impl ThreadPool for RejectingPool {
        fn add(&self, _job: Job) -> bool {
            false
        }
        fn len(&self) -> usize {
            0
        }
    }

    #[test]
    fn add_fn_reports_rejection() {
        let pool = RejectingPool;
        assert!(!pool.add_fn(|| {}));
    }

    #[test]
    fn safe_add_fn_turns_rejection_into_an_error() {
        let pool = RejectingPool;
        assert_eq!(pool.safe_add_fn(|| {}), Err(PoolError::Rejected));
    }

    #[test]
    fn options_builder_round_trip() {
        let opts = PoolOptions::new()
            .blocking(true)
            .catching(false)
            .thread_name_prefix("worker-");
        assert!(opts.blocking);
        assert!(!opts.catching);
        assert_eq!(opts.thread_name.as_deref(), Some("worker-"));
        assert!(opts.enumerate_threads);

        let opts = opts.thread_name("fixed");
        assert!(!opts.enumerate_threads);
    }

    #[test]
    fn create_pool_picks_inline_for_small_counts() {
        let pool = create_pool(1, 0, PoolOptions::new()).expect("create");
        assert!(pool.add_fn(|| {}));
        assert_eq!(pool.len(), 0);
    }
}
