//! Priority-ordered process teardown registry.
//!
//! Callbacks registered with [`at_exit`] run when [`drain`] is called —
//! from the daemon's orderly-shutdown path — in descending priority, and
//! within a priority, latest registration first. Singleton finalizers
//! (see [`crate::singleton`]) are sequenced through the same registry.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crossbeam_queue::SegQueue;

use crate::sync::atomic::AtomicCounter;

/// Runs-last default priority.
pub const DEFAULT_PRIORITY: usize = usize::MAX;

type ExitFn = Box<dyn FnOnce() + Send>;

struct Record {
    f: ExitFn,
    priority: usize,
    seq: usize,
}

struct Registry {
    pending: SegQueue<Record>,
    seq: AtomicCounter,
}

fn registry() -> &'static Registry {
    static REGISTRY: std::sync::OnceLock<Registry> = std::sync::OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        pending: SegQueue::new(),
        seq: AtomicCounter::new(0),
    })
}

/// Registers `f` to run at teardown with [`DEFAULT_PRIORITY`].
pub fn at_exit(f: impl FnOnce() + Send + 'static) {
    at_exit_with_priority(f, DEFAULT_PRIORITY);
}

/// Registers `f` to run at teardown with the given priority. Higher
/// priorities run first; ties run in reverse registration order.
pub fn at_exit_with_priority(f: impl FnOnce() + Send + 'static, priority: usize) {
    let reg = registry();
    reg.pending.push(Record {
        f: Box::new(f),
        priority,
        seq: reg.seq.fetch_inc(),
    });
}

/// Runs every registered callback. Callbacks registered while draining are
/// picked up in a follow-up round. Panics inside a callback are swallowed
/// with a warning so the remaining callbacks still run.
pub fn drain() {
    let reg = registry();
    loop {
        let mut batch = Vec::new();
        while let Some(record) = reg.pending.pop() {
            batch.push(record);
        }
        if batch.is_empty() {
            break;
        }
        batch.sort_by_key(|r| std::cmp::Reverse((r.priority, r.seq)));
        for record in batch {
            let priority = record.priority;
            if catch_unwind(AssertUnwindSafe(record.f)).is_err() {
                tracing::warn!(priority, "at-exit callback panicked; continuing teardown");
            }
        }
    }
}
