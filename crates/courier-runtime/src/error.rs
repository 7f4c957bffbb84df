//! Runtime error types.
//!
//! Library errors are small `thiserror` enums. [`Fault`] is the carrier for
//! errors that travel upward with accumulated context: a message buffer,
//! the source location of the original failure, and an optionally captured
//! backtrace. [`Failure`] is the cheaply-cloneable boxed form stored inside
//! future cells and rethrown to every waiter.

use std::backtrace::Backtrace;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use thiserror::Error;

/// A shared, cloneable error value.
///
/// Futures may have many consumers; each rethrow hands out a clone of the
/// same underlying error.
pub type Failure = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Wraps a concrete error into a [`Failure`].
pub fn failure<E>(err: E) -> Failure
where
    E: std::error::Error + Send + Sync + 'static,
{
    Arc::new(err)
}

/// Builds a [`Failure`] from a panic payload.
///
/// Used by pool workers and future continuations to turn a caught panic into
/// an error value instead of tearing down the thread.
pub fn panic_failure(payload: Box<dyn std::any::Any + Send>) -> Failure {
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with non-string payload".to_string());
    Arc::new(Fault::here().with("panic: ").with(msg))
}

/// Errors surfaced by future and promise cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FutureError {
    /// A second value or error was stored into a single-assignment cell.
    #[error("value already set")]
    ValueAlreadySet,
    /// A zero-timeout read found the cell empty.
    #[error("value not set")]
    ValueNotSet,
    /// A bounded wait elapsed before the cell was filled.
    #[error("wait timeout")]
    WaitTimeout,
    /// The value was already moved out of the cell.
    #[error("value was moved")]
    ValueWasMoved,
    /// A move was attempted after the value had been read in place.
    #[error("value being read")]
    ValueBeingRead,
    /// The handle carries no backing state.
    #[error("state not initialized")]
    StateNotInitialized,
}

impl FutureError {
    /// Converts into the shared error form stored in future cells.
    pub fn into_failure(self) -> Failure {
        Arc::new(self)
    }
}

/// Errors surfaced by thread pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The pool rejected a submission (stopped, or bounded and full in
    /// non-blocking mode).
    #[error("can not add job to queue")]
    Rejected,
    /// An operation requires a started pool.
    #[error("thread pool not started")]
    NotStarted,
    /// `start` was called on a running pool.
    #[error("thread pool already started")]
    AlreadyStarted,
}

/// Errors surfaced by the thread wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadError {
    /// `start` on a thread that is already running.
    #[error("can not start running thread")]
    AlreadyStarted,
    /// `join` or `detach` on a thread that was never started.
    #[error("can not join thread that was not started")]
    NotStarted,
    /// `start` or `join` on a thread that already finished.
    #[error("thread already joined")]
    AlreadyJoined,
    /// The OS refused to spawn the thread.
    #[error("failed to create thread: {0}")]
    Spawn(String),
    /// The thread terminated by panicking.
    #[error("thread panicked: {0}")]
    Panicked(String),
}

/// An error carrier that accumulates context on its way up.
///
/// ```
/// use courier_runtime::error::Fault;
///
/// let fault = Fault::here().with("mutex init failed (").with(22).with(")");
/// assert!(fault.to_string().contains("mutex init failed (22)"));
/// ```
#[derive(Debug)]
pub struct Fault {
    context: String,
    location: Option<&'static Location<'static>>,
    backtrace: Option<Backtrace>,
    os_code: Option<i32>,
}

impl Fault {
    /// Creates an empty fault tagged with the caller's source location.
    #[track_caller]
    pub fn here() -> Self {
        Self {
            context: String::new(),
            location: Some(Location::caller()),
            backtrace: None,
            os_code: None,
        }
    }

    /// Creates an empty fault with no source location.
    pub fn new() -> Self {
        Self {
            context: String::new(),
            location: None,
            backtrace: None,
            os_code: None,
        }
    }

    /// Creates a fault describing an OS error code, prefixed with the
    /// canonical error text.
    #[track_caller]
    pub fn from_os(code: i32) -> Self {
        let text = std::io::Error::from_raw_os_error(code);
        let mut fault = Self::here();
        fault.os_code = Some(code);
        fault.with("(").with(text).with(") ")
    }

    /// Creates a fault from the thread's last OS error.
    #[track_caller]
    pub fn last_os() -> Self {
        let err = std::io::Error::last_os_error();
        Self::from_os(err.raw_os_error().unwrap_or(0))
    }

    /// Appends a displayable value to the context buffer.
    pub fn with(mut self, part: impl fmt::Display) -> Self {
        use fmt::Write;
        let _ = write!(self.context, "{part}");
        self
    }

    /// Captures the current backtrace into the fault.
    pub fn traced(mut self) -> Self {
        self.backtrace = Some(Backtrace::force_capture());
        self
    }

    /// The saved OS error code, if this fault wraps one.
    pub fn os_code(&self) -> Option<i32> {
        self.os_code
    }

    /// The captured backtrace, if any.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_ref()
    }
}

impl Default for Fault {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(loc) = self.location {
            write!(f, "{}:{}: ", loc.file(), loc.line())?;
        }
        f.write_str(&self.context)
    }
}

impl std::error::Error for Fault {}
