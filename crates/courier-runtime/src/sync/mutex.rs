//! Recursive mutex.
//!
//! The holding thread may reacquire; every acquire must be paired with a
//! release. Releasing from a thread that does not hold the lock is an
//! invariant violation and panics.

use crate::sync::atomic::AtomicWord;
use crate::sync::guard::RawLock;
use crate::sync::spinlock::SpinWait;
use crate::thread::current_thread_id;

/// A recursive mutual-exclusion lock.
///
/// Ownership is tracked by hashed thread id; the recursion depth is touched
/// only by the owning thread.
#[derive(Debug, Default)]
pub struct Mutex {
    owner: AtomicWord,
    depth: AtomicWord,
}

impl Mutex {
    /// Creates an unlocked mutex.
    pub const fn new() -> Self {
        Self {
            owner: AtomicWord::new(0),
            depth: AtomicWord::new(0),
        }
    }

    /// Whether the calling thread holds the lock.
    pub fn held_by_current_thread(&self) -> bool {
        self.owner.load() == current_thread_id()
    }
}

impl RawLock for Mutex {
    fn acquire(&self) {
        let me = current_thread_id();
        if self.owner.load() == me {
            let depth = self.depth.load();
            self.depth.store(depth + 1);
            return;
        }
        if !self.owner.compare_and_set(0, me) {
            let mut backoff = SpinWait::new();
            loop {
                backoff.sleep();
                if self.owner.load() == 0 && self.owner.compare_and_set(0, me) {
                    break;
                }
            }
        }
        self.depth.store(1);
    }

    fn release(&self) {
        let me = current_thread_id();
        assert!(
            self.owner.load() == me,
            "mutex released by a thread that does not hold it"
        );
        let depth = self.depth.load();
        if depth <= 1 {
            self.depth.store(0);
            self.owner.store(0);
        } else {
            self.depth.store(depth - 1);
        }
    }

    fn try_acquire(&self) -> bool {
        let me = current_thread_id();
        if self.owner.load() == me {
            let depth = self.depth.load();
            self.depth.store(depth + 1);
            return true;
        }
        if self.owner.compare_and_set(0, me) {
            self.depth.store(1);
            return true;
        }
        false
    }
}
