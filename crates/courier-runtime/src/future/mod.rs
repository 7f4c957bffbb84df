//! Single-shot futures and promises.
//!
//! A [`Promise`] writes a value or an error exactly once; every [`Future`]
//! handle to the same state observes it. Waiting goes through a lazily
//! created manual-reset [`Event`]; continuations registered with
//! [`Future::subscribe`] fire exactly once — inline on the caller if the
//! state is already terminal, otherwise on the thread that performs the
//! transition, after the state store and the ready-event signal.
//!
//! Panics or errors raised by a continuation propagate to whichever thread
//! called `set_value`/`set_error`; producers must treat that as a real
//! possibility. Continuations installed via [`Future::apply`] instead have
//! their failure captured into the produced future.

mod combine;

pub use combine::{wait_all, wait_any, wait_exception_or_all};

use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use crossbeam_queue::SegQueue;

use crate::error::{Failure, FutureError};
use crate::singleton::{singleton, SingletonInit};
use crate::sync::event::Event;
use crate::sync::guard::guard;
use crate::sync::spinlock::AdaptiveLock;
use crate::sync::atomic::AtomicWord;
use crate::time::Deadline;

const NOT_READY: usize = 0;
const EXCEPTION_SET: usize = 1;
const VALUE_MOVED: usize = 2;
const VALUE_SET: usize = 3;
const VALUE_READ: usize = 4;

type Callback<T> = Box<dyn FnOnce(&Future<T>) + Send>;

struct FutureState<T: Send + 'static> {
    state: AtomicWord,
    lock: AdaptiveLock,
    value: StdMutex<Option<T>>,
    error: OnceLock<Failure>,
    callbacks: SegQueue<Callback<T>>,
    ready: OnceLock<Event>,
}

fn cell_lock<T>(cell: &StdMutex<Option<T>>) -> std::sync::MutexGuard<'_, Option<T>> {
    cell.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl<T: Send + 'static> FutureState<T> {
    fn new() -> Self {
        Self {
            state: AtomicWord::new(NOT_READY),
            lock: AdaptiveLock::new(),
            value: StdMutex::new(None),
            error: OnceLock::new(),
            callbacks: SegQueue::new(),
            ready: OnceLock::new(),
        }
    }

    fn with_value(value: T) -> Self {
        let state = Self::new();
        *cell_lock(&state.value) = Some(value);
        state.state.store(VALUE_SET);
        state
    }

    fn with_error(error: Failure) -> Self {
        let state = Self::new();
        let _ = state.error.set(error);
        state.state.store(EXCEPTION_SET);
        state
    }

    fn has_value(&self) -> bool {
        matches!(self.state.load(), VALUE_SET | VALUE_READ | VALUE_MOVED)
    }

    fn has_error(&self) -> bool {
        self.state.load() == EXCEPTION_SET
    }

    fn stored_error(&self) -> Failure {
        self.error
            .get()
            .cloned()
            .expect("terminal error state carries an error")
    }

    fn try_rethrow(&self) -> Result<(), Failure> {
        if self.state.load() == EXCEPTION_SET {
            Err(self.stored_error())
        } else {
            Ok(())
        }
    }

    /// Stores the outcome if the cell is still empty; fires the ready event
    /// and drains registered callbacks on success.
    fn try_complete(this: &Arc<Self>, outcome: Result<T, Failure>) -> bool {
        let ready = {
            let _g = guard(&this.lock);
            if this.state.load() != NOT_READY {
                return false;
            }
            match outcome {
                Ok(value) => {
                    *cell_lock(&this.value) = Some(value);
                    this.state.store(VALUE_SET);
                }
                Err(error) => {
                    let _ = this.error.set(error);
                    this.state.store(EXCEPTION_SET);
                }
            }
            this.ready.get().cloned()
        };

        if let Some(event) = ready {
            event.signal();
        }

        let future = Future {
            state: Arc::clone(this),
        };
        while let Some(callback) = this.callbacks.pop() {
            callback(&future);
        }
        true
    }

    fn wait_deadline(&self, deadline: Deadline) -> bool {
        if self.state.load() != NOT_READY {
            return true;
        }
        let event = {
            let _g = guard(&self.lock);
            if self.state.load() != NOT_READY {
                return true;
            }
            self.ready.get_or_init(Event::manual).clone()
        };
        event.wait_deadline(deadline)
    }

    /// Blocks (within `timeout`) for a terminal state, then attempts the
    /// `VALUE_SET -> target` transition, mapping every losing case to its
    /// error.
    fn access_value(&self, timeout: Duration, target: usize) -> Result<(), Failure> {
        let state = self.state.load();
        if state == NOT_READY {
            if timeout.is_zero() {
                return Err(FutureError::ValueNotSet.into_failure());
            }
            if !self.wait_deadline(Deadline::after(timeout)) {
                return Err(FutureError::WaitTimeout.into_failure());
            }
        }

        if self.state.load() == EXCEPTION_SET {
            return Err(self.stored_error());
        }

        match self.state.compare_exchange(VALUE_SET, target) {
            VALUE_SET => Ok(()),
            VALUE_READ if target == VALUE_READ => Ok(()),
            VALUE_READ => Err(FutureError::ValueBeingRead.into_failure()),
            VALUE_MOVED => Err(FutureError::ValueWasMoved.into_failure()),
            other => unreachable!("future cell in impossible state {other}"),
        }
    }
}

/// Opaque identity of a future's backing state; equal for every handle to
/// the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(usize);

/// The producing half of a future cell.
pub struct Promise<T: Send + 'static> {
    state: Arc<FutureState<T>>,
}

/// The consuming half of a future cell.
pub struct Future<T: Send + 'static> {
    state: Arc<FutureState<T>>,
}

impl<T: Send + 'static> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send + 'static> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send + 'static> PartialEq for Future<T> {
    fn eq(&self, other: &Self) -> bool {
        self.state_id() == other.state_id()
    }
}

impl<T: Send + 'static> Eq for Future<T> {}

impl<T: Send + 'static> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future").field("state_id", &self.state_id()).finish()
    }
}

impl<T: Send + 'static> std::hash::Hash for Future<T> {
    fn hash<H: std::hash::Hasher>(&self, hasher: &mut H) {
        self.state_id().hash(hasher);
    }
}

/// Creates a fresh promise; [`Promise::future`] hands out consumer handles.
pub fn promise<T: Send + 'static>() -> Promise<T> {
    Promise {
        state: Arc::new(FutureState::new()),
    }
}

/// An already-satisfied future.
pub fn make_future<T: Send + 'static>(value: T) -> Future<T> {
    Future {
        state: Arc::new(FutureState::with_value(value)),
    }
}

/// An already-failed future.
pub fn make_error_future<T: Send + 'static>(error: Failure) -> Future<T> {
    Future {
        state: Arc::new(FutureState::with_error(error)),
    }
}

struct ReadyFutureCache {
    instance: Future<()>,
}

impl SingletonInit for ReadyFutureCache {
    fn init() -> Self {
        Self {
            instance: make_future(()),
        }
    }
}

/// The shared, already-satisfied unit future.
pub fn ready_future() -> Future<()> {
    singleton::<ReadyFutureCache>().instance.clone()
}

impl<T: Send + 'static> Promise<T> {
    /// A consumer handle onto this promise's state.
    pub fn future(&self) -> Future<T> {
        Future {
            state: Arc::clone(&self.state),
        }
    }

    /// Stores the value; [`FutureError::ValueAlreadySet`] if the cell was
    /// already terminal.
    pub fn set_value(&self, value: T) -> Result<(), FutureError> {
        if self.try_set_value(value) {
            Ok(())
        } else {
            Err(FutureError::ValueAlreadySet)
        }
    }

    /// Stores the value unless the cell is already terminal.
    pub fn try_set_value(&self, value: T) -> bool {
        FutureState::try_complete(&self.state, Ok(value))
    }

    /// Stores the error; [`FutureError::ValueAlreadySet`] if the cell was
    /// already terminal.
    pub fn set_error(&self, error: Failure) -> Result<(), FutureError> {
        if self.try_set_error(error) {
            Ok(())
        } else {
            Err(FutureError::ValueAlreadySet)
        }
    }

    /// Stores the error unless the cell is already terminal.
    pub fn try_set_error(&self, error: Failure) -> bool {
        FutureState::try_complete(&self.state, Err(error))
    }

    /// Whether a value is present (set, read, or moved).
    pub fn has_value(&self) -> bool {
        self.state.has_value()
    }

    /// Whether the cell terminated with an error.
    pub fn has_error(&self) -> bool {
        self.state.has_error()
    }

    /// Propagates a stored error without consuming anything.
    pub fn try_rethrow(&self) -> Result<(), Failure> {
        self.state.try_rethrow()
    }

    /// Identity of the backing state.
    pub fn state_id(&self) -> StateId {
        StateId(Arc::as_ptr(&self.state) as usize)
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Non-blocking read of the stored value.
    pub fn get(&self) -> Result<T, Failure> {
        self.state.access_value(Duration::ZERO, VALUE_READ)?;
        Ok(cell_lock(&self.state.value)
            .as_ref()
            .cloned()
            .expect("read state implies a stored value"))
    }
}

impl<T: Send + 'static> Future<T> {
    /// Whether a value is present (set, read, or moved).
    pub fn has_value(&self) -> bool {
        self.state.has_value()
    }

    /// Whether the cell terminated with an error.
    pub fn has_error(&self) -> bool {
        self.state.has_error()
    }

    /// Propagates a stored error without consuming anything.
    pub fn try_rethrow(&self) -> Result<(), Failure> {
        self.state.try_rethrow()
    }

    /// Blocks until the cell is terminal.
    pub fn wait(&self) {
        self.state.wait_deadline(Deadline::Never);
    }

    /// Blocks up to `timeout`; returns whether the cell became terminal.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.state.wait_deadline(Deadline::after(timeout))
    }

    /// Blocks until the deadline; returns whether the cell became terminal.
    pub fn wait_deadline(&self, deadline: Deadline) -> bool {
        self.state.wait_deadline(deadline)
    }

    /// Moves the value out. A zero timeout is a non-blocking probe; a
    /// positive one bounds the wait. After extraction the cell reports
    /// [`FutureError::ValueWasMoved`] to every further access.
    pub fn extract(&self, timeout: Duration) -> Result<T, Failure> {
        self.state.access_value(timeout, VALUE_MOVED)?;
        Ok(cell_lock(&self.state.value)
            .take()
            .expect("moved state implies a stored value"))
    }

    /// Moves the value out, waiting as long as it takes.
    pub fn extract_sync(&self) -> Result<T, Failure> {
        self.extract(Duration::MAX)
    }

    /// Registers `f` to run exactly once when the cell becomes terminal;
    /// runs it inline if it already is.
    pub fn subscribe<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&Future<T>) + Send + 'static,
    {
        {
            let _g = guard(&self.state.lock);
            if self.state.state.load() == NOT_READY {
                self.state.callbacks.push(Box::new(f));
                return self;
            }
        }
        f(self);
        self
    }

    /// Produces a future carrying `f`'s result. Errors returned by `f` —
    /// and panics raised by it — are captured into the produced future
    /// rather than propagated to the completing thread.
    pub fn apply<R, F>(&self, f: F) -> Future<R>
    where
        R: Send + 'static,
        F: FnOnce(&Future<T>) -> Result<R, Failure> + Send + 'static,
    {
        let next = promise::<R>();
        let producer = next.clone();
        self.subscribe(move |future| {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(future)));
            match outcome {
                Ok(Ok(value)) => {
                    let _ = producer.try_set_value(value);
                }
                Ok(Err(error)) => {
                    let _ = producer.try_set_error(error);
                }
                Err(payload) => {
                    let _ = producer.try_set_error(crate::error::panic_failure(payload));
                }
            }
        });
        next.future()
    }

    /// A unit future mirroring this one's completion; errors propagate,
    /// values are discarded.
    pub fn ignore(&self) -> Future<()> {
        let next = promise::<()>();
        let producer = next.clone();
        self.subscribe(move |future| match future.try_rethrow() {
            Ok(()) => {
                let _ = producer.try_set_value(());
            }
            Err(error) => {
                let _ = producer.try_set_error(error);
            }
        });
        next.future()
    }

    /// Identity of the backing state.
    pub fn state_id(&self) -> StateId {
        StateId(Arc::as_ptr(&self.state) as usize)
    }
}

impl<T: Clone + Send + 'static> Future<T> {
    /// Reads the value in place. A zero timeout is a non-blocking probe; a
    /// positive one bounds the wait. The value stays readable afterwards.
    pub fn get(&self, timeout: Duration) -> Result<T, Failure> {
        self.state.access_value(timeout, VALUE_READ)?;
        Ok(cell_lock(&self.state.value)
            .as_ref()
            .cloned()
            .expect("read state implies a stored value"))
    }

    /// Reads the value, waiting as long as it takes.
    pub fn get_sync(&self) -> Result<T, Failure> {
        self.get(Duration::MAX)
    }
}

impl Future<()> {
    /// A future of `value` that completes together with this one. Errors
    /// shadow the value.
    pub fn with_value<R: Send + 'static>(&self, value: R) -> Future<R> {
        let next = promise::<R>();
        let producer = next.clone();
        self.subscribe(move |future| match future.try_rethrow() {
            Ok(()) => {
                let _ = producer.try_set_value(value);
            }
            Err(error) => {
                let _ = producer.try_set_error(error);
            }
        });
        next.future()
    }
}

impl<T: Clone + Send + 'static> Future<Future<T>> {
    /// Collapses a future of a future: the result resolves when the inner
    /// future does, with either layer's error winning.
    pub fn flatten(&self) -> Future<T> {
        let next = promise::<T>();
        let producer = next.clone();
        self.subscribe(move |outer| match outer.get(Duration::ZERO) {
            Ok(inner) => {
                inner.subscribe(move |f| match f.get(Duration::ZERO) {
                    Ok(value) => {
                        let _ = producer.try_set_value(value);
                    }
                    Err(error) => {
                        let _ = producer.try_set_error(error);
                    }
                });
            }
            Err(error) => {
                let _ = producer.try_set_error(error);
            }
        });
        next.future()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{failure, Fault};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn downcast_future_error(err: &Failure) -> Option<FutureError> {
        err.downcast_ref::<FutureError>().copied()
    }

    #[test]
    fn initially_has_no_value() {
        let p = promise::<i32>();
        assert!(!p.has_value());
        assert!(!p.future().has_value());
        assert!(!p.future().has_error());
    }

    #[test]
    fn stores_and_reads_value() {
        let p = promise::<i32>();
        p.set_value(123).expect("first set");
        assert!(p.has_value());
        assert_eq!(p.get().expect("promise read"), 123);

        let f = p.future();
        assert!(f.has_value());
        assert_eq!(f.get(Duration::ZERO).expect("future read"), 123);

        let ready = make_future(345);
        assert_eq!(ready.get(Duration::ZERO).expect("ready read"), 345);
    }

    #[test]
    fn second_set_fails_with_value_already_set() {
        let p = promise::<i32>();
        p.set_value(1).expect("first set");
        assert_eq!(p.set_value(2), Err(FutureError::ValueAlreadySet));
        assert!(!p.try_set_value(3));
        assert!(!p.try_set_error(failure(Fault::new().with("late"))));
        // the original value survives
        assert_eq!(p.get().expect("read"), 1);
    }

    #[test]
    fn exactly_one_of_value_or_error_wins() {
        let p = promise::<()>();
        assert!(p.try_set_error(failure(Fault::new().with("boom"))));
        assert!(!p.try_set_value(()));
        assert_eq!(p.set_value(()), Err(FutureError::ValueAlreadySet));
        assert!(p.has_error());
        assert!(!p.has_value());
    }

    #[test]
    fn zero_timeout_read_of_empty_cell_fails() {
        let p = promise::<i32>();
        let err = p.future().get(Duration::ZERO).expect_err("no value yet");
        assert_eq!(downcast_future_error(&err), Some(FutureError::ValueNotSet));
    }

    #[test]
    fn bounded_wait_times_out() {
        let p = promise::<i32>();
        let err = p
            .future()
            .get(Duration::from_millis(30))
            .expect_err("nobody sets the value");
        assert_eq!(downcast_future_error(&err), Some(FutureError::WaitTimeout));
    }

    #[test]
    fn get_blocks_until_value_arrives() {
        let p = promise::<i32>();
        let f = p.future();
        let setter = {
            let p = p.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                p.set_value(7).expect("set");
            })
        };
        assert_eq!(f.get_sync().expect("value arrives"), 7);
        setter.join().expect("setter panicked");
    }

    #[test]
    fn extract_then_read_fails_with_value_was_moved() {
        let p = promise::<String>();
        p.set_value("payload".to_string()).expect("set");
        let f = p.future();
        assert_eq!(f.extract(Duration::ZERO).expect("extract"), "payload");

        let err = f.get(Duration::ZERO).expect_err("moved");
        assert_eq!(downcast_future_error(&err), Some(FutureError::ValueWasMoved));
        let err = f.extract(Duration::ZERO).expect_err("moved");
        assert_eq!(downcast_future_error(&err), Some(FutureError::ValueWasMoved));
        // has_value still answers true: the cell completed with a value
        assert!(f.has_value());
    }

    #[test]
    fn extract_after_read_fails_with_value_being_read() {
        let p = promise::<i32>();
        p.set_value(5).expect("set");
        let f = p.future();
        assert_eq!(f.get(Duration::ZERO).expect("read"), 5);
        let err = f.extract(Duration::ZERO).expect_err("read already");
        assert_eq!(downcast_future_error(&err), Some(FutureError::ValueBeingRead));
        // reads keep working
        assert_eq!(f.get(Duration::ZERO).expect("read again"), 5);
    }

    #[test]
    fn subscribe_before_set_fires_once_after_value_is_visible() {
        let p = promise::<i32>();
        let fired = Arc::new(AtomicUsize::new(0));
        let observed = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            let observed = Arc::clone(&observed);
            p.future().subscribe(move |f| {
                fired.fetch_add(1, Ordering::SeqCst);
                observed.store(
                    usize::try_from(f.get(Duration::ZERO).expect("visible")).expect("nonneg"),
                    Ordering::SeqCst,
                );
            });
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        p.set_value(456).expect("set");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(observed.load(Ordering::SeqCst), 456);
    }

    #[test]
    fn subscribe_after_set_runs_inline() {
        let f = make_future(9);
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            f.subscribe(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn apply_transforms_the_value() {
        let p = promise::<i32>();
        let doubled = p.future().apply(|f| Ok(f.get(Duration::ZERO)? * 2));
        p.set_value(21).expect("set");
        assert_eq!(doubled.get_sync().expect("apply result"), 42);
    }

    #[test]
    fn apply_captures_functor_errors() {
        let p = promise::<i32>();
        let out: Future<i32> =
            p.future().apply(|_| Err(failure(Fault::new().with("functor refused"))));
        p.set_value(1).expect("set");
        let err = out.get_sync().expect_err("captured");
        assert!(err.to_string().contains("functor refused"));
    }

    #[test]
    fn apply_captures_functor_panics() {
        let p = promise::<i32>();
        let out: Future<i32> = p.future().apply(|_| panic!("functor exploded"));
        p.set_value(1).expect("set");
        let err = out.get_sync().expect_err("captured");
        assert!(err.to_string().contains("functor exploded"));
    }

    #[test]
    fn flatten_resolves_with_the_inner_future() {
        let p = promise::<i32>();
        let inner_gate = promise::<i32>();
        let inner = inner_gate.future();
        let flat = p
            .future()
            .apply(move |f| {
                f.try_rethrow()?;
                Ok(inner.clone())
            })
            .flatten();

        p.set_value(0).expect("outer set");
        assert!(!flat.has_value(), "must wait for the inner future");
        inner_gate.set_value(99).expect("inner set");
        assert_eq!(flat.get_sync().expect("flattened"), 99);
    }

    #[test]
    fn ignore_propagates_errors_and_drops_values() {
        let ok = make_future(5).ignore();
        assert!(ok.has_value());

        let failed: Future<i32> = make_error_future(failure(Fault::new().with("storage down")));
        let mirrored = failed.ignore();
        assert!(mirrored.has_error());
        assert!(mirrored.try_rethrow().is_err());
    }

    #[test]
    fn with_value_rides_on_completion() {
        let p = promise::<i32>();
        let tagged = p.future().ignore().with_value(42);
        assert!(!tagged.has_value());
        p.set_value(456).expect("set");
        assert_eq!(tagged.get_sync().expect("tagged"), 42);
    }

    #[test]
    fn error_reaches_every_consumer() {
        let p = promise::<i32>();
        p.set_error(failure(Fault::new().with("backend offline")))
            .expect("set error");
        let f = p.future();
        assert!(f.has_error());
        let e1 = f.get(Duration::ZERO).expect_err("error");
        let e2 = f.try_rethrow().expect_err("error");
        assert!(e1.to_string().contains("backend offline"));
        assert!(e2.to_string().contains("backend offline"));
    }

    #[test]
    fn state_identity_is_shared_and_distinct() {
        let p1 = promise::<i32>();
        let f1a = p1.future();
        let f1b = p1.future();
        assert_eq!(f1a.state_id(), f1b.state_id());
        assert_eq!(f1a, f1b);
        assert_eq!(p1.state_id(), f1a.state_id());

        let p2 = promise::<i32>();
        assert_ne!(f1a.state_id(), p2.future().state_id());
    }

    #[test]
    fn ready_future_is_cached() {
        let a = ready_future();
        let b = ready_future();
        assert_eq!(a.state_id(), b.state_id());
        assert!(a.has_value());
    }

    #[test]
    fn wait_does_not_consume() {
        let p = promise::<i32>();
        let f = p.future();
        assert!(!f.wait_timeout(Duration::from_millis(10)));
        p.set_value(3).expect("set");
        assert!(f.wait_timeout(Duration::ZERO));
        f.wait();
        assert_eq!(f.get(Duration::ZERO).expect("still readable"), 3);
    }
}
