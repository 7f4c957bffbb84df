//! Keyed thread-local value cells.
//!
//! A [`ThreadLocalValue`] owns a process-unique integer key and a
//! constructor. The first access from a thread builds the instance and files
//! it in that thread's table under the key; the instance is dropped when the
//! thread exits. Keys below a small threshold index a contiguous vector;
//! higher keys fall back to a map so the per-thread tables stay bounded.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::sync::atomic::AtomicCounter;

const FAST_KEY_LIMIT: usize = 10_000;

static NEXT_KEY: AtomicCounter = AtomicCounter::new(0);

#[derive(Default)]
struct PerThreadTable {
    fast: Vec<Option<Box<dyn Any>>>,
    far: HashMap<usize, Box<dyn Any>>,
}

impl PerThreadTable {
    fn with_slot<R>(&mut self, key: usize, f: impl FnOnce(&mut Option<Box<dyn Any>>) -> R) -> R {
        if key < FAST_KEY_LIMIT {
            if key >= self.fast.len() {
                self.fast.resize_with(key + 1, || None);
            }
            f(&mut self.fast[key])
        } else {
            let mut slot = self.far.remove(&key);
            let out = f(&mut slot);
            if let Some(value) = slot {
                self.far.insert(key, value);
            }
            out
        }
    }
}

thread_local! {
    static TABLE: RefCell<PerThreadTable> = RefCell::new(PerThreadTable::default());
}

/// A per-thread, lazily constructed value.
///
/// The cell itself is cheap to clone and share; each thread sees its own
/// instance, destroyed at thread exit.
#[derive(Clone)]
pub struct ThreadLocalValue<T: Send + 'static> {
    key: usize,
    init: Arc<dyn Fn() -> T + Send + Sync>,
}

impl<T: Send + 'static> ThreadLocalValue<T> {
    /// Creates a cell whose per-thread instances are built by `init`.
    pub fn new(init: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            key: NEXT_KEY.fetch_inc(),
            init: Arc::new(init),
        }
    }

    /// The cell's process-unique key.
    pub fn key(&self) -> usize {
        self.key
    }

    /// Runs `f` against the calling thread's instance, constructing it
    /// first if this is the thread's first access.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        TABLE.with(|table| {
            let mut table = table.borrow_mut();
            table.with_slot(self.key, |slot| {
                if slot.is_none() {
                    *slot = Some(Box::new((self.init)()));
                }
                let value = slot
                    .as_mut()
                    .and_then(|boxed| boxed.downcast_mut::<T>())
                    .expect("thread-local slot holds a value of the registered type");
                f(value)
            })
        })
    }

    /// Replaces the calling thread's instance.
    pub fn set(&self, value: T) {
        self.with(|slot| *slot = value);
    }
}

impl<T: Clone + Send + 'static> ThreadLocalValue<T> {
    /// Clones the calling thread's instance out.
    pub fn get(&self) -> T {
        self.with(|value| value.clone())
    }
}

impl<T: Default + Send + 'static> Default for ThreadLocalValue<T> {
    fn default() -> Self {
        Self::new(T::default)
    }
}
