//! Synchronization primitives.
//!
//! Everything here is built from word-sized atomics and thread parking; the
//! higher layers (events, futures, pools) compose these rather than going to
//! the OS directly.

pub mod atomic;
pub mod condvar;
pub mod event;
pub mod guard;
pub mod mutex;
pub mod spinlock;

pub use atomic::{AtomicCounter, AtomicWord};
pub use condvar::CondVar;
pub use event::{Event, ResetMode};
pub use guard::{guard, unguard, LockGuard, RawLock, Unguard};
pub use mutex::Mutex;
pub use spinlock::{AdaptiveLock, SpinLock};
