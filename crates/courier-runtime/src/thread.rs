//! Named OS threads with an explicit start/join/detach contract.
//!
//! [`Thread`] wraps `std::thread::Builder`: construction captures the
//! closure, `start` spawns, `join` reaps exactly once, `detach` releases
//! ownership, and drop joins a still-running thread. Misuse (starting twice,
//! joining a never-started thread) surfaces as [`ThreadError`] instead of
//! silently doing the wrong thing.
//!
//! Thread ids are not the raw OS handles: each thread draws a process-unique
//! sequence number on first use and runs it through an integer hash
//! finalizer, yielding a word-sized id with good distribution that is never
//! reused for the lifetime of the process.

use std::cell::{Cell, RefCell};
use std::thread::JoinHandle;

use crate::error::ThreadError;
use crate::sync::atomic::AtomicCounter;

/// A word-sized, hashed, process-unique thread id.
pub type ThreadId = usize;

static THREAD_SEQ: AtomicCounter = AtomicCounter::new(0);

thread_local! {
    static CURRENT_ID: Cell<ThreadId> = const { Cell::new(0) };
    static CURRENT_NAME: RefCell<Option<String>> = const { RefCell::new(None) };
}

// 64-bit avalanche finalizer, same shape the original runtime hashes
// pthread handles through.
#[cfg(target_pointer_width = "64")]
fn int_hash(mut key: usize) -> usize {
    key = key.wrapping_add(!(key << 32));
    key ^= key >> 22;
    key = key.wrapping_add(!(key << 13));
    key ^= key >> 8;
    key = key.wrapping_add(key << 3);
    key ^= key >> 15;
    key = key.wrapping_add(!(key << 27));
    key ^= key >> 31;
    key
}

#[cfg(target_pointer_width = "32")]
fn int_hash(mut key: usize) -> usize {
    key = key.wrapping_add(!(key << 15));
    key ^= key >> 10;
    key = key.wrapping_add(key << 3);
    key ^= key >> 6;
    key = key.wrapping_add(!(key << 11));
    key ^= key >> 16;
    key
}

/// The calling thread's id.
pub fn current_thread_id() -> ThreadId {
    CURRENT_ID.with(|cell| {
        let id = cell.get();
        if id != 0 {
            return id;
        }
        let mut id = int_hash(THREAD_SEQ.inc());
        if id == 0 || id == impossible_thread_id() {
            id = 1;
        }
        cell.set(id);
        id
    })
}

/// An id no live thread can have.
pub fn impossible_thread_id() -> ThreadId {
    ThreadId::MAX
}

/// Records a name for the calling thread, readable via
/// [`current_thread_name`].
pub fn set_current_thread_name(name: &str) {
    CURRENT_NAME.with(|cell| *cell.borrow_mut() = Some(name.to_string()));
}

/// The calling thread's recorded name, falling back to the name the thread
/// was spawned with, then to the empty string.
pub fn current_thread_name() -> String {
    let local = CURRENT_NAME.with(|cell| cell.borrow().clone());
    if let Some(name) = local {
        return name;
    }
    std::thread::current().name().unwrap_or_default().to_string()
}

enum ThreadState {
    New(Box<dyn FnOnce() + Send + 'static>),
    Running(JoinHandle<()>),
    Done,
}

/// An owned OS thread.
pub struct Thread {
    name: Option<String>,
    stack_size: Option<usize>,
    state: ThreadState,
}

impl Thread {
    /// Captures `f` without spawning.
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self {
            name: None,
            stack_size: None,
            state: ThreadState::New(Box::new(f)),
        }
    }

    /// Captures `f` under the given thread name.
    pub fn named(name: impl Into<String>, f: impl FnOnce() + Send + 'static) -> Self {
        let mut t = Self::new(f);
        t.name = Some(name.into());
        t
    }

    /// Requests a specific stack size for the spawned thread.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Spawns the captured closure.
    pub fn start(&mut self) -> Result<(), ThreadError> {
        match std::mem::replace(&mut self.state, ThreadState::Done) {
            ThreadState::New(f) => {
                let mut builder = std::thread::Builder::new();
                if let Some(name) = &self.name {
                    builder = builder.name(name.clone());
                }
                if let Some(bytes) = self.stack_size {
                    builder = builder.stack_size(bytes);
                }
                let name = self.name.clone();
                let handle = builder
                    .spawn(move || {
                        if let Some(name) = name {
                            set_current_thread_name(&name);
                        }
                        f();
                    })
                    .map_err(|e| ThreadError::Spawn(e.to_string()))?;
                self.state = ThreadState::Running(handle);
                Ok(())
            }
            ThreadState::Running(handle) => {
                self.state = ThreadState::Running(handle);
                Err(ThreadError::AlreadyStarted)
            }
            ThreadState::Done => Err(ThreadError::AlreadyJoined),
        }
    }

    /// Waits for the thread to finish. A panic on the thread is reported as
    /// [`ThreadError::Panicked`].
    pub fn join(&mut self) -> Result<(), ThreadError> {
        match std::mem::replace(&mut self.state, ThreadState::Done) {
            ThreadState::Running(handle) => handle.join().map_err(|payload| {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                ThreadError::Panicked(msg)
            }),
            ThreadState::New(f) => {
                self.state = ThreadState::New(f);
                Err(ThreadError::NotStarted)
            }
            ThreadState::Done => Err(ThreadError::AlreadyJoined),
        }
    }

    /// Releases ownership; the thread keeps running.
    pub fn detach(&mut self) {
        if let ThreadState::Running(_) = self.state {
            self.state = ThreadState::Done;
        }
    }

    /// Whether the thread has been started and not yet joined or detached.
    pub fn is_running(&self) -> bool {
        matches!(self.state, ThreadState::Running(_))
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.join();
        }
    }
}
