//! Fixed-size pool over a FIFO queue.

use std::sync::Arc;

use crossbeam_queue::SegQueue;

use crate::error::PoolError;
use crate::pool::{run_job, Job, NoHooks, PoolOptions, SharedHooks, ThreadNamer, ThreadPool};
use crate::sync::atomic::{AtomicCounter, AtomicWord};
use crate::sync::condvar::CondVar;
use crate::sync::guard::RawLock;
use crate::sync::mutex::Mutex;
use crate::thread::Thread;

struct Shared {
    queue: SegQueue<Job>,
    queue_len: AtomicCounter,
    queue_mutex: Mutex,
    push_cond: CondVar,
    pop_cond: CondVar,

    stop_mutex: Mutex,
    stop_cond: CondVar,

    should_terminate: AtomicWord,
    running: AtomicCounter,

    max_queue_len: usize,
    expected: usize,
    blocking: bool,
    catching: bool,

    namer: ThreadNamer,
    hooks: SharedHooks,
}

impl Shared {
    fn add(&self, job: Job) -> bool {
        if self.should_terminate.load() == 1 {
            return false;
        }

        if self.expected == 0 {
            // zero workers: the caller is the worker
            run_job(job, self.catching);
            return true;
        }

        self.queue_mutex.acquire();
        while self.max_queue_len > 0
            && self.queue_len.value() >= self.max_queue_len
            && self.should_terminate.load() == 0
        {
            if !self.blocking {
                self.queue_mutex.release();
                return false;
            }
            self.pop_cond.wait(&self.queue_mutex);
        }
        if self.should_terminate.load() == 1 {
            self.queue_mutex.release();
            return false;
        }
        self.queue.push(job);
        self.queue_len.inc();
        self.queue_mutex.release();

        self.push_cond.signal();
        true
    }

    fn worker_loop(&self) {
        self.namer.apply();
        self.hooks.worker_started();

        loop {
            self.queue_mutex.acquire();
            while self.queue_len.value() == 0 && self.should_terminate.load() == 0 {
                self.push_cond.wait(&self.queue_mutex);
            }
            if self.should_terminate.load() == 1 && self.queue_len.value() == 0 {
                self.queue_mutex.release();
                break;
            }
            let job = self.queue.pop();
            if job.is_some() {
                self.queue_len.dec();
            }
            self.queue_mutex.release();

            let Some(job) = job else { continue };
            self.pop_cond.signal();
            run_job(job, self.catching);
        }

        self.hooks.worker_stopping();
        self.finish_one_worker();
    }

    fn finish_one_worker(&self) {
        self.stop_mutex.acquire();
        self.running.dec();
        self.stop_cond.signal();
        self.stop_mutex.release();
    }

    fn wait_for_complete(&self) {
        self.stop_mutex.acquire();
        while self.running.value() > 0 {
            // keep nudging workers that raced into the queue wait
            self.queue_mutex.acquire();
            self.push_cond.signal();
            self.queue_mutex.release();
            self.stop_cond
                .wait_timeout(&self.stop_mutex, std::time::Duration::from_millis(50));
        }
        self.stop_mutex.release();
    }
}

/// N workers sharing a FIFO queue.
///
/// With `queue_limit > 0` the queue is bounded: producers either block until
/// space frees up (`blocking`) or are rejected. `stop` drains jobs already
/// queued before joining the workers.
pub struct FixedThreadPool {
    options: PoolOptions,
    hooks: SharedHooks,
    shared: Option<Arc<Shared>>,
    // join handles; the cell keeps the pool shareable by reference
    workers: std::sync::Mutex<Vec<Thread>>,
}

impl FixedThreadPool {
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
            workers: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn workers(&self) -> std::sync::MutexGuard<'_, Vec<Thread>> {
        self.workers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Spawns `thread_count` workers over a queue bounded at `queue_limit`
    /// (0 = unbounded). With zero workers, `add` runs jobs inline.
    pub fn start(&mut self, thread_count: usize, queue_limit: usize) -> Result<(), PoolError> {
        if self.shared.is_some() {
            return Err(PoolError::AlreadyStarted);
        }

        let shared = Arc::new(Shared {
            queue: SegQueue::new(),
            queue_len: AtomicCounter::new(0),
            queue_mutex: Mutex::new(),
            push_cond: CondVar::new(),
            pop_cond: CondVar::new(),
            stop_mutex: Mutex::new(),
            stop_cond: CondVar::new(),
            should_terminate: AtomicWord::new(0),
            running: AtomicCounter::new(0),
            max_queue_len: queue_limit,
            expected: thread_count,
            blocking: self.options.blocking,
            catching: self.options.catching,
            namer: ThreadNamer::new(&self.options),
            hooks: Arc::clone(&self.hooks),
        });

        for i in 0..thread_count {
            let worker_shared = Arc::clone(&shared);
            let mut thread = Thread::named(format!("pool-worker-{i}"), move || {
                worker_shared.worker_loop();
            });
            shared.running.inc();
            if let Err(e) = thread.start() {
                shared.running.dec();
                self.shared = Some(shared);
                self.stop();
                tracing::error!(error = %e, "failed to spawn pool worker");
                return Err(PoolError::NotStarted);
            }
            self.workers().push(thread);
        }

        self.shared = Some(shared);
        Ok(())
    }

    /// Flags termination, wakes everyone, drains the queue through the
    /// workers, and joins them. Queued jobs are *not* discarded.
    pub fn stop(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        shared.should_terminate.store(1);
        shared.queue_mutex.acquire();
        shared.pop_cond.broadcast();
        shared.queue_mutex.release();

        shared.wait_for_complete();
        let mut workers = std::mem::take(&mut *self.workers());
        for worker in &mut workers {
            let _ = worker.join();
        }
    }

    /// Worker count requested at start.
    pub fn expected_threads(&self) -> usize {
        self.shared.as_ref().map_or(0, |s| s.expected)
    }

    /// Workers currently alive.
    pub fn running_threads(&self) -> usize {
        self.shared.as_ref().map_or(0, |s| s.running.value())
    }

    /// The queue bound, 0 when unbounded.
    pub fn max_queue_len(&self) -> usize {
        self.shared.as_ref().map_or(0, |s| s.max_queue_len)
    }
}

impl ThreadPool for FixedThreadPool {
    fn add(&self, job: Job) -> bool {
        match &self.shared {
            Some(shared) => shared.add(job),
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.shared.as_ref().map_or(0, |s| s.queue_len.value())
    }
}

impl Drop for FixedThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ThreadPoolExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[test]
    fn runs_every_job() {
        const JOBS: usize = 1000;

        let mut pool = FixedThreadPool::new(PoolOptions::new());
        pool.start(10, JOBS).expect("start");

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

    // One worker and a bounded queue dispatch in submission order.
    #[test]
    fn single_worker_preserves_fifo_order() {
        const JOBS: usize = 200;

        let mut pool = FixedThreadPool::new(PoolOptions::new().blocking(true));
        pool.start(1, 8).expect("start");

        let order = Arc::new(StdMutex::new(Vec::new()));
        for i in 0..JOBS {
            let order = Arc::clone(&order);
            assert!(pool.add_fn(move || {
                order.lock().expect("order lock").push(i);
            }));
        }
        pool.stop();

        let seen = order.lock().expect("order lock").clone();
        assert_eq!(seen, (0..JOBS).collect::<Vec<_>>());
    }

    // A blocking producer stalls on a full queue and resumes as soon as a
    // dequeue makes room.
    #[test]
    fn blocking_producer_waits_for_space() {
        let mut pool = FixedThreadPool::new(PoolOptions::new().blocking(true));
        pool.start(1, 2).expect("start");

        let gate = Arc::new(crate::sync::event::Event::manual());
        {
            let gate = Arc::clone(&gate);
            assert!(pool.add_fn(move || gate.wait()));
        }
        // fill the queue behind the gated job
        for _ in 0..2 {
            assert!(pool.add_fn(|| {}));
        }

        let pool = Arc::new(StdMutex::new(pool));
        let producer = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let pool = pool.lock().expect("pool lock");
                let started = std::time::Instant::now();
                assert!(pool.add_fn(|| {}));
                started.elapsed()
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        gate.signal();
        let blocked_for = producer.join().expect("producer panicked");
        assert!(
            blocked_for >= Duration::from_millis(40),
            "producer returned after {blocked_for:?} without blocking"
        );
        pool.lock().expect("pool lock").stop();
    }

    #[test]
    fn nonblocking_full_queue_rejects() {
        let mut pool = FixedThreadPool::new(PoolOptions::new());
        pool.start(1, 1).expect("start");

        let gate = Arc::new(crate::sync::event::Event::manual());
        {
            let gate = Arc::clone(&gate);
            assert!(pool.add_fn(move || gate.wait()));
        }
        assert!(pool.add_fn(|| {})); // fills the queue slot
        std::thread::sleep(Duration::from_millis(10));
        assert!(!pool.add_fn(|| {}), "full non-blocking queue must reject");

        gate.signal();
        pool.stop();
    }

    #[test]
    fn stop_drains_queued_jobs() {
        let mut pool = FixedThreadPool::new(PoolOptions::new());
        pool.start(2, 0).expect("start");

        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let done = Arc::clone(&done);
            assert!(pool.add_fn(move || {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.stop();
        assert_eq!(done.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn add_after_stop_is_rejected() {
        let mut pool = FixedThreadPool::new(PoolOptions::new());
        pool.start(2, 0).expect("start");
        pool.stop();
        assert!(!pool.add_fn(|| {}));
    }

    #[test]
    fn zero_workers_run_inline() {
        let mut pool = FixedThreadPool::new(PoolOptions::new());
        pool.start(0, 0).expect("start");

        let ran = Arc::new(AtomicUsize::new(0));
        {
            let ran = Arc::clone(&ran);
            assert!(pool.add_fn(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        // inline execution completes before add returns
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        pool.stop();
    }

    #[test]
    fn catching_workers_survive_job_panics() {
        let mut pool = FixedThreadPool::new(PoolOptions::new().catching(true));
        pool.start(1, 0).expect("start");

        assert!(pool.add_fn(|| panic!("job exploded")));
        let done = Arc::new(AtomicUsize::new(0));
        {
            let done = Arc::clone(&done);
            assert!(pool.add_fn(move || {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.stop();
        assert_eq!(done.load(Ordering::SeqCst), 1, "worker died with the panic");
    }

    #[test]
    fn info_getters_reflect_start_arguments() {
        let mut pool = FixedThreadPool::new(PoolOptions::new());
        pool.start(2, 7).expect("start");
        assert_eq!(pool.expected_threads(), 2);
        assert_eq!(pool.running_threads(), 2);
        assert_eq!(pool.max_queue_len(), 7);
        pool.stop();

        assert_eq!(pool.expected_threads(), 0);
        pool.start(4, 1).expect("restart");
        assert_eq!(pool.expected_threads(), 4);
        assert_eq!(pool.max_queue_len(), 1);
        pool.stop();
    }

    #[test]
    fn double_start_is_an_error() {
        let mut pool = FixedThreadPool::new(PoolOptions::new());
        pool.start(1, 0).expect("start");
        assert_eq!(pool.start(1, 0), Err(PoolError::AlreadyStarted));
        pool.stop();
    }
}
