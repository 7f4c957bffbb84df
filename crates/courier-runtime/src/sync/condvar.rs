//! Condition variable for the runtime [`Mutex`].
//!
//! Waiters park with [`std::thread::park_timeout`]; the waiter queue is a
//! lock-free FIFO, so signalling never takes a lock. The caller must hold
//! the mutex when waiting; it is released for the duration of the block and
//! reacquired before returning. As with POSIX condition variables, waiting
//! while holding the mutex recursively is a contract violation.

use std::sync::Arc;

use crossbeam_queue::SegQueue;

use crate::sync::atomic::AtomicWord;
use crate::sync::guard::RawLock;
use crate::sync::mutex::Mutex;
use crate::time::Deadline;

const WAITING: usize = 0;
const NOTIFIED: usize = 1;
const CANCELLED: usize = 2;

struct Waiter {
    thread: std::thread::Thread,
    state: AtomicWord,
}

/// A condition variable.
#[derive(Default)]
pub struct CondVar {
    waiters: SegQueue<Arc<Waiter>>,
}

impl CondVar {
    /// Creates a condition variable with no waiters.
    pub fn new() -> Self {
        Self {
            waiters: SegQueue::new(),
        }
    }

    /// Blocks until signalled. The mutex must be held.
    pub fn wait(&self, mutex: &Mutex) {
        self.wait_deadline(mutex, Deadline::Never);
    }

    /// Blocks until signalled or `timeout` elapses; returns whether the
    /// signal arrived in time.
    pub fn wait_timeout(&self, mutex: &Mutex, timeout: std::time::Duration) -> bool {
        self.wait_deadline(mutex, Deadline::after(timeout))
    }

    /// Blocks until signalled or the deadline passes; returns whether the
    /// signal arrived in time.
    pub fn wait_deadline(&self, mutex: &Mutex, deadline: Deadline) -> bool {
        let waiter = Arc::new(Waiter {
            thread: std::thread::current(),
            state: AtomicWord::new(WAITING),
        });
        self.waiters.push(Arc::clone(&waiter));

        mutex.release();

        let mut signalled = loop {
            if waiter.state.load() == NOTIFIED {
                break true;
            }
            match deadline.remaining() {
                None => std::thread::park(),
                Some(rem) if rem.is_zero() => break false,
                Some(rem) => std::thread::park_timeout(rem),
            }
        };

        if !signalled {
            // A signal may have slipped in between the deadline check and
            // now; cancelling only succeeds if it did not.
            signalled = !waiter.state.compare_and_set(WAITING, CANCELLED);
        }

        mutex.acquire();
        signalled
    }

    /// Loops the wait until `pred` holds or the deadline passes; returns the
    /// final predicate value. `pred` must be free of side effects: a
    /// spurious wake may evaluate it an extra time.
    pub fn wait_until<P: FnMut() -> bool>(
        &self,
        mutex: &Mutex,
        deadline: Deadline,
        mut pred: P,
    ) -> bool {
        while !pred() {
            if !self.wait_deadline(mutex, deadline) {
                return pred();
            }
        }
        true
    }

    /// Wakes one waiter.
    pub fn signal(&self) {
        while let Some(waiter) = self.waiters.pop() {
            if waiter.state.compare_and_set(WAITING, NOTIFIED) {
                waiter.thread.unpark();
                return;
            }
            // timed out concurrently; skip the corpse
        }
    }

    /// Wakes every waiter.
    pub fn broadcast(&self) {
        while let Some(waiter) = self.waiters.pop() {
            if waiter.state.compare_and_set(WAITING, NOTIFIED) {
                waiter.thread.unpark();
            }
        }
    }
}
