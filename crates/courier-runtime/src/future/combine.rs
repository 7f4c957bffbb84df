//! Multi-future combinators.
//!
//! All three operate on unit futures; [`Future::ignore`] bridges typed
//! futures in. The empty input is already satisfied, and a single input is
//! degenerate: the composite *is* that input, state identity included.

use std::sync::Arc;

use crate::error::Failure;
use crate::sync::atomic::AtomicCounter;
use crate::sync::guard::RawLock;
use crate::sync::spinlock::SpinLock;

use super::{promise, ready_future, Future, Promise};

/// Resolves once every input has resolved, success or failure. If any input
/// failed, reading the composite rethrows the first failure observed; the
/// rest are dropped.
pub fn wait_all(futures: &[Future<()>]) -> Future<()> {
    if futures.is_empty() {
        return ready_future();
    }
    if futures.len() == 1 {
        return futures[0].clone();
    }

    struct AllWaiter {
        promise: Promise<()>,
        remaining: AtomicCounter,
        first_error: std::sync::OnceLock<Failure>,
    }

    let waiter = Arc::new(AllWaiter {
        promise: promise(),
        remaining: AtomicCounter::new(futures.len()),
        first_error: std::sync::OnceLock::new(),
    });

    for future in futures {
        let waiter = Arc::clone(&waiter);
        future.subscribe(move |f| {
            if let Err(error) = f.try_rethrow() {
                let _ = waiter.first_error.set(error);
            }
            if waiter.remaining.dec() == 0 {
                match waiter.first_error.get() {
                    Some(error) => {
                        let _ = waiter.promise.try_set_error(error.clone());
                    }
                    None => {
                        let _ = waiter.promise.try_set_value(());
                    }
                }
            }
        });
    }

    waiter.promise.future()
}

/// Resolves on the first failure, or once every input has succeeded. The
/// first failure shadows any later success or failure.
pub fn wait_exception_or_all(futures: &[Future<()>]) -> Future<()> {
    if futures.is_empty() {
        return ready_future();
    }
    if futures.len() == 1 {
        return futures[0].clone();
    }

    struct ExceptionOrAllWaiter {
        promise: Promise<()>,
        remaining: AtomicCounter,
    }

    let waiter = Arc::new(ExceptionOrAllWaiter {
        promise: promise(),
        remaining: AtomicCounter::new(futures.len()),
    });

    for future in futures {
        let waiter = Arc::clone(&waiter);
        future.subscribe(move |f| match f.try_rethrow() {
            Err(error) => {
                let _ = waiter.promise.try_set_error(error);
            }
            // failures do not count down: only an all-success run hits zero
            Ok(()) => {
                if waiter.remaining.dec() == 0 {
                    let _ = waiter.promise.try_set_value(());
                }
            }
        });
    }

    waiter.promise.future()
}

/// Resolves with the first input to finish; if that input failed, the
/// composite fails with its error.
pub fn wait_any(futures: &[Future<()>]) -> Future<()> {
    if futures.is_empty() {
        return ready_future();
    }
    if futures.len() == 1 {
        return futures[0].clone();
    }

    struct AnyWaiter {
        promise: Promise<()>,
        claimed: SpinLock,
    }

    let waiter = Arc::new(AnyWaiter {
        promise: promise(),
        claimed: SpinLock::new(),
    });

    for future in futures {
        let waiter = Arc::clone(&waiter);
        future.subscribe(move |f| {
            // first finisher claims the composite; the lock is never released
            if waiter.claimed.try_acquire() {
                match f.try_rethrow() {
                    Ok(()) => {
                        let _ = waiter.promise.try_set_value(());
                    }
                    Err(error) => {
                        let _ = waiter.promise.try_set_error(error);
                    }
                }
            }
        });
    }

    waiter.promise.future()
}
