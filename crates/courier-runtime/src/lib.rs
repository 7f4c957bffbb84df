//! # courier-runtime: the concurrency runtime under the courier daemon
//!
//! A hand-built execution toolkit on plain OS threads — no async runtime,
//! following the project's design principle of explicit control flow:
//!
//! - word atomics and counters ([`sync::atomic`])
//! - spin, adaptive, and recursive locks with scoped guards ([`sync`])
//! - a condition variable and manual/auto reset events ([`sync::condvar`],
//!   [`sync::event`])
//! - single-shot futures and promises with continuations and multi-future
//!   combinators ([`future`])
//! - named threads with an explicit lifecycle ([`thread`])
//! - keyed thread-local value cells ([`tls`])
//! - a priority-ordered at-exit registry and lazy singletons ([`at_exit`],
//!   [`singleton`])
//! - fixed / adaptive / inline / simple thread pools and a pool-to-future
//!   bridge ([`pool`], [`spawn`])
//!
//! Blocking waits bottom out in thread parking; shared mutable payloads live
//! in lock-free cells composed with the hand-built waiting primitives.

pub mod at_exit;
pub mod error;
pub mod future;
pub mod pool;
pub mod singleton;
pub mod spawn;
pub mod sync;
pub mod thread;
pub mod time;
pub mod tls;

pub use error::{failure, Failure, Fault, FutureError, PoolError, ThreadError};
pub use future::{
    make_error_future, make_future, promise, ready_future, wait_all, wait_any,
    wait_exception_or_all, Future, Promise, StateId,
};
pub use pool::{
    create_pool, AdaptiveThreadPool, FixedThreadPool, InlineThreadPool, Job, NoHooks, PoolOptions,
    SimpleThreadPool, ThreadPool, ThreadPoolExt, WorkerHooks,
};
pub use spawn::{spawn, spawn_flat};
pub use sync::{
    guard, unguard, AdaptiveLock, AtomicCounter, AtomicWord, CondVar, Event, LockGuard, Mutex,
    RawLock, ResetMode, SpinLock, Unguard,
};
pub use thread::{current_thread_id, current_thread_name, set_current_thread_name, Thread};
pub use time::Deadline;
pub use tls::ThreadLocalValue;
