//! Manual- and auto-reset events.
//!
//! An [`Event`] is a one-bit rendezvous: `signal` sets it, `wait` blocks
//! until it is set. Clones share the same underlying state, so a waiter and
//! a signaller can outlive each other independently.

use std::sync::Arc;
use std::time::Duration;

use crate::sync::atomic::AtomicWord;
use crate::sync::condvar::CondVar;
use crate::sync::guard::RawLock;
use crate::sync::mutex::Mutex;
use crate::time::Deadline;

/// Whether the signalled flag clears automatically on wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// The event stays signalled until [`Event::reset`] is called.
    Manual,
    /// The flag clears inside the first waiter that wakes.
    Auto,
}

struct EventBody {
    mutex: Mutex,
    cond: CondVar,
    signaled: AtomicWord,
    manual: bool,
}

/// A shared reset event.
#[derive(Clone)]
pub struct Event {
    body: Arc<EventBody>,
}

impl Event {
    /// Creates an unsignalled event with the given reset mode.
    pub fn new(mode: ResetMode) -> Self {
        Self {
            body: Arc::new(EventBody {
                mutex: Mutex::new(),
                cond: CondVar::new(),
                signaled: AtomicWord::new(0),
                manual: mode == ResetMode::Manual,
            }),
        }
    }

    /// A manual-reset event.
    pub fn manual() -> Self {
        Self::new(ResetMode::Manual)
    }

    /// An auto-reset event.
    pub fn auto() -> Self {
        Self::new(ResetMode::Auto)
    }

    /// Sets the flag and wakes waiters: all of them for a manual event, one
    /// for an auto event. Signalling an already-signalled manual event is a
    /// no-op.
    pub fn signal(&self) {
        let body = &*self.body;
        if body.manual && body.signaled.load() == 1 {
            return;
        }

        body.mutex.acquire();
        body.signaled.store(1);
        body.mutex.release();

        if body.manual {
            body.cond.broadcast();
        } else {
            body.cond.signal();
        }
    }

    /// Clears the flag.
    pub fn reset(&self) {
        self.body.signaled.store(0);
    }

    /// Blocks until signalled.
    pub fn wait(&self) {
        self.wait_deadline(Deadline::Never);
    }

    /// Blocks until signalled or `timeout` elapses; returns whether the
    /// signal arrived in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_deadline(Deadline::after(timeout))
    }

    /// Blocks until signalled or the deadline passes; returns whether the
    /// signal arrived in time.
    pub fn wait_deadline(&self, deadline: Deadline) -> bool {
        let body = &*self.body;
        if body.manual && body.signaled.load() == 1 {
            return true;
        }

        let mut signalled = true;
        body.mutex.acquire();
        while body.signaled.load() == 0 {
            if !body.cond.wait_deadline(&body.mutex, deadline) {
                signalled = body.signaled.load() == 1;
                break;
            }
        }
        if !body.manual {
            body.signaled.store(0);
        }
        body.mutex.release();

        signalled
    }
}
