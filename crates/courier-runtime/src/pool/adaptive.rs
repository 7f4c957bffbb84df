//! Spawn-on-demand pool with idle-timeout teardown.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_queue::ArrayQueue;

use crate::error::PoolError;
use crate::pool::{run_job, Job, NoHooks, PoolOptions, SharedHooks, ThreadNamer, ThreadPool};
use crate::sync::atomic::{AtomicCounter, AtomicWord};
use crate::sync::condvar::CondVar;
use crate::sync::guard::RawLock;
use crate::sync::mutex::Mutex;
use crate::thread::Thread;
use crate::time::Deadline;

const IDLE_FOREVER: usize = usize::MAX;

struct Shared {
    // single hand-off slot in lieu of a queue
    slot: ArrayQueue<Job>,
    mutex: Mutex,
    cond_ready: CondVar,
    cond_free: CondVar,

    all_done: AtomicWord,
    threads: AtomicCounter,
    free: AtomicCounter,
    idle_micros: AtomicWord,

    catching: bool,
    namer: ThreadNamer,
    hooks: SharedHooks,
    name: String,
}

static POOL_COUNTER: AtomicCounter = AtomicCounter::new(0);

impl Shared {
    fn add(this: &Arc<Self>, job: Job) -> bool {
        this.mutex.acquire();
        while !this.slot.is_empty() {
            this.cond_free.wait(&this.mutex);
        }
        if this.all_done.load() == 1 {
            this.mutex.release();
            return false;
        }
        if this.free.value() == 0 {
            Self::spawn_worker(this);
        }
        if this.slot.push(job).is_err() {
            // the slot was emptied-and-filled while we held the mutex;
            // cannot happen, but do not lose the job if it somehow does
            this.mutex.release();
            return false;
        }
        this.mutex.release();

        this.cond_ready.signal();
        true
    }

    fn spawn_worker(this: &Arc<Self>) {
        this.threads.inc();
        let shared = Arc::clone(this);
        let mut thread = Thread::named(this.name.clone(), move || shared.worker_loop());
        if thread.start().is_err() {
            this.threads.dec();
            return;
        }
        // workers retire themselves on idle timeout; nobody joins them
        thread.detach();
    }

    fn worker_loop(&self) {
        self.namer.apply();
        self.hooks.worker_started();

        while let Some(job) = self.wait_for_job() {
            run_job(job, self.catching);
        }

        self.hooks.worker_stopping();
        self.threads.dec();
    }

    fn wait_for_job(&self) -> Option<Job> {
        self.mutex.acquire();
        self.free.inc();

        while self.slot.is_empty() && self.all_done.load() == 0 {
            let idle = self.idle_micros.load();
            let deadline = if idle == IDLE_FOREVER {
                Deadline::Never
            } else {
                Deadline::after(Duration::from_micros(idle as u64))
            };
            if !self.cond_ready.wait_deadline(&self.mutex, deadline) {
                break;
            }
        }

        let job = self.slot.pop();
        self.free.dec();
        self.mutex.release();
        self.cond_free.signal();
        job
    }
}

/// A pool with no queue: `add` parks the job in a single hand-off slot,
/// spawning a worker if none is free. Workers that see no work for the
/// configured idle time retire; a later `add` spawns anew.
pub struct AdaptiveThreadPool {
    options: PoolOptions,
    hooks: SharedHooks,
    shared: Option<Arc<Shared>>,
}

impl AdaptiveThreadPool {
    /// Creates an unstarted pool.
    pub fn new(options: PoolOptions) -> Self {
        Self::with_hooks(options, Arc::new(NoHooks))
    }

    /// Creates an unstarted pool with per-worker lifecycle hooks.
    pub fn with_hooks(options: PoolOptions, hooks: SharedHooks) -> Self {
        Self {
            options,
            hooks,
            shared: None,
        }
    }

    /// Makes the pool live. Workers are spawned lazily by `add`.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.shared.is_some() {
            return Err(PoolError::AlreadyStarted);
        }
        let index = POOL_COUNTER.inc();
        self.shared = Some(Arc::new(Shared {
            slot: ArrayQueue::new(1),
            mutex: Mutex::new(),
            cond_ready: CondVar::new(),
            cond_free: CondVar::new(),
            all_done: AtomicWord::new(0),
            threads: AtomicCounter::new(0),
            free: AtomicCounter::new(0),
            idle_micros: AtomicWord::new(IDLE_FOREVER),
            catching: self.options.catching,
            namer: ThreadNamer::new(&self.options),
            hooks: Arc::clone(&self.hooks),
            name: format!("adaptive-pool-{index}"),
        }));
        Ok(())
    }

    /// Workers idle longer than `interval` retire.
    pub fn set_max_idle_time(&self, interval: Duration) -> Result<(), PoolError> {
        let shared = self.shared.as_ref().ok_or(PoolError::NotStarted)?;
        let micros = usize::try_from(interval.as_micros()).unwrap_or(IDLE_FOREVER);
        shared.idle_micros.store(micros);
        // wake idle workers so the new timeout takes effect promptly
        shared.cond_ready.broadcast();
        Ok(())
    }

    /// Flags shutdown and waits for every worker to retire.
    pub fn stop(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        shared.all_done.store(1);
        while shared.threads.value() > 0 {
            shared.cond_ready.broadcast();
            std::thread::yield_now();
        }
    }
}

impl ThreadPool for AdaptiveThreadPool {
    fn add(&self, job: Job) -> bool {
        match &self.shared {
            Some(shared) => Shared::add(shared, job),
            None => false,
        }
    }

    /// Live worker count.
    fn len(&self) -> usize {
        self.shared.as_ref().map_or(0, |s| s.threads.value())
    }
}

impl Drop for AdaptiveThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ThreadPoolExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn runs_jobs_and_reuses_workers() {
        const JOBS: usize = 200;

        let mut pool = AdaptiveThreadPool::new(PoolOptions::new());
        pool.start().expect("start");

        let sum = Arc::new(AtomicUsize::new(0));
        for i in 0..JOBS {
            let sum = Arc::clone(&sum);
            assert!(pool.add_fn(move || {
                sum.fetch_add(i, Ordering::SeqCst);
            }));
        }
        pool.stop();
        assert_eq!(sum.load(Ordering::SeqCst), (0..JOBS).sum());
    }

    #[test]
    fn spawns_workers_on_demand() {
        let mut pool = AdaptiveThreadPool::new(PoolOptions::new());
        pool.start().expect("start");
        assert_eq!(pool.len(), 0);

        let gate = Arc::new(crate::sync::event::Event::manual());
        for _ in 0..3 {
            let gate = Arc::clone(&gate);
            assert!(pool.add_fn(move || gate.wait()));
        }
        assert!(pool.len() >= 3, "each busy worker forces a new spawn");
        gate.signal();
        pool.stop();
        assert_eq!(pool.len(), 0);
    }

    // After max_idle_time with no work the worker count decays to zero,
    // and a later add starts fresh.
    #[test]
    fn idle_workers_retire_after_the_timeout() {
        let mut pool = AdaptiveThreadPool::new(PoolOptions::new());
        pool.start().expect("start");
        pool.set_max_idle_time(Duration::from_millis(50)).expect("configure");

        let ran = Arc::new(AtomicUsize::new(0));
        {
            let ran = Arc::clone(&ran);
            assert!(pool.add_fn(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let deadline = Instant::now() + Duration::from_secs(2);
        while ran.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(pool.len(), 0, "idle worker did not retire");

        // a new submission resurrects the pool
        {
            let ran = Arc::clone(&ran);
            assert!(pool.add_fn(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let deadline = Instant::now() + Duration::from_secs(2);
        while ran.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(ran.load(Ordering::SeqCst), 2);
        pool.stop();
    }

    #[test]
    fn set_max_idle_time_requires_start() {
        let pool = AdaptiveThreadPool::new(PoolOptions::new());
        assert_eq!(
            pool.set_max_idle_time(Duration::from_secs(1)),
            Err(PoolError::NotStarted)
        );
    }

    #[test]
    fn add_after_stop_is_rejected() {
        let mut pool = AdaptiveThreadPool::new(PoolOptions::new());
        pool.start().expect("start");
        pool.stop();
        assert!(!pool.add_fn(|| {}));
    }
}
