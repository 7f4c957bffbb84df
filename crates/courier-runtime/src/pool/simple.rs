//! Convenience pool that picks its engine from the thread count.

use std::sync::Arc;
use std::time::Duration;

use crate::error::PoolError;
use crate::pool::{
    AdaptiveThreadPool, FixedThreadPool, Job, NoHooks, PoolOptions, SharedHooks, ThreadPool,
};

const ADAPTIVE_IDLE_TIME: Duration = Duration::from_secs(100);

enum Engine {
    Fixed(FixedThreadPool),
    Adaptive(AdaptiveThreadPool),
}

/// Starts a fixed pool for a positive thread count and an adaptive pool
/// (with a 100-second idle timeout) for zero, forwarding the same worker
/// hooks either way.
pub struct SimpleThreadPool {
    options: PoolOptions,
    hooks: SharedHooks,
    engine: Option<Engine>,
}

impl SimpleThreadPool {
    /// Creates an unstarted pool.
    pub fn new(options: PoolOptions) -> Self {
        Self::with_hooks(options, Arc::new(NoHooks))
    }

    /// Creates an unstarted pool with per-worker lifecycle hooks.
    pub fn with_hooks(options: PoolOptions, hooks: SharedHooks) -> Self {
        Self {
            options,
            hooks,
            engine: None,
        }
    }

    /// Starts the underlying engine.
    pub fn start(&mut self, thread_count: usize, queue_limit: usize) -> Result<(), PoolError> {
        if self.engine.is_some() {
            return Err(PoolError::AlreadyStarted);
        }
        if thread_count > 0 {
            let mut fixed =
                FixedThreadPool::with_hooks(self.options.clone(), Arc::clone(&self.hooks));
            fixed.start(thread_count, queue_limit)?;
            self.engine = Some(Engine::Fixed(fixed));
        } else {
            let mut adaptive =
                AdaptiveThreadPool::with_hooks(self.options.clone(), Arc::clone(&self.hooks));
            adaptive.start()?;
            adaptive.set_max_idle_time(ADAPTIVE_IDLE_TIME)?;
            self.engine = Some(Engine::Adaptive(adaptive));
        }
        Ok(())
    }

    /// Stops the underlying engine.
    pub fn stop(&mut self) {
        match self.engine.take() {
            Some(Engine::Fixed(mut pool)) => pool.stop(),
            Some(Engine::Adaptive(mut pool)) => pool.stop(),
            None => {}
        }
    }
}

impl ThreadPool for SimpleThreadPool {
    fn add(&self, job: Job) -> bool {
        match &self.engine {
            Some(Engine::Fixed(pool)) => pool.add(job),
            Some(Engine::Adaptive(pool)) => pool.add(job),
            None => false,
        }
    }

    fn len(&self) -> usize {
        match &self.engine {
            Some(Engine::Fixed(pool)) => pool.len(),
            Some(Engine::Adaptive(pool)) => pool.len(),
            None => 0,
        }
    }
}

impl Drop for SimpleThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}
