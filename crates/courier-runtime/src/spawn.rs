//! Bridge from thread pools to futures.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{panic_failure, Failure, PoolError};
use crate::future::{promise, Future};
use crate::pool::{ThreadPool, ThreadPoolExt};

/// Schedules `f` on `pool` and returns a future for its result.
///
/// Errors returned by `f` — and panics raised by it — complete the future's
/// error side instead of escaping the worker. A rejected submission is
/// reported to the caller, not to the future.
pub fn spawn<T, F>(pool: &dyn ThreadPool, f: F) -> Result<Future<T>, PoolError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Failure> + Send + 'static,
{
    let p = promise::<T>();
    let producer = p.clone();
    pool.safe_add_fn(move || match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => {
            let _ = producer.try_set_value(value);
        }
        Ok(Err(error)) => {
            let _ = producer.try_set_error(error);
        }
        Err(payload) => {
            let _ = producer.try_set_error(panic_failure(payload));
        }
    })?;
    Ok(p.future())
}

/// Like [`spawn`], for functions that themselves return a future: the
/// result resolves when the inner future does.
pub fn spawn_flat<T, F>(pool: &dyn ThreadPool, f: F) -> Result<Future<T>, PoolError>
where
    T: Clone + Send + 'static,
    F: FnOnce() -> Result<Future<T>, Failure> + Send + 'static,
{
    Ok(spawn(pool, f)?.flatten())
}
