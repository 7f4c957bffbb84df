//! Lazy process singletons.
//!
//! [`singleton`] constructs one instance per type on first use. Construction
//! is serialized per type and tracks the constructing thread id, so a
//! reentrant construction of the same singleton from the same thread — an
//! initialization cycle — panics instead of deadlocking. Finalizers are
//! sequenced through the at-exit registry at the type's chosen priority.
//!
//! Instances are heap-allocated and leaked; teardown runs the type's
//! `finalize` hook rather than dropping memory that outstanding references
//! may still point at.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Mutex as StdMutex, OnceLock};

use crate::at_exit::at_exit_with_priority;
use crate::thread::current_thread_id;

/// Default teardown priority for singletons; lower than user-facing
/// registrations so the registry outlives them.
pub const DEFAULT_SINGLETON_PRIORITY: usize = 65_536;

/// Types that can live as process singletons.
pub trait SingletonInit: Send + Sync + Sized + 'static {
    /// Teardown priority passed to the at-exit registry.
    const TEARDOWN_PRIORITY: usize = DEFAULT_SINGLETON_PRIORITY;

    /// Builds the instance. Must not (transitively) request the same
    /// singleton.
    fn init() -> Self;

    /// Cleanup hook run during at-exit drain.
    fn finalize(&self) {}
}

enum Slot {
    Building(usize),
    Ready(&'static (dyn Any + Send + Sync)),
}

fn slots() -> &'static StdMutex<HashMap<TypeId, Slot>> {
    static SLOTS: OnceLock<StdMutex<HashMap<TypeId, Slot>>> = OnceLock::new();
    SLOTS.get_or_init(|| StdMutex::new(HashMap::new()))
}

fn lock_slots() -> std::sync::MutexGuard<'static, HashMap<TypeId, Slot>> {
    slots()
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// The process-wide instance of `T`, constructed on first call.
pub fn singleton<T: SingletonInit>() -> &'static T {
    let me = current_thread_id();
    loop {
        enum Action {
            Done(&'static (dyn Any + Send + Sync)),
            Build,
            Wait,
        }

        let action = {
            let mut map = lock_slots();
            match map.entry(TypeId::of::<T>()) {
                std::collections::hash_map::Entry::Occupied(entry) => match entry.get() {
                    Slot::Ready(any) => Action::Done(*any),
                    Slot::Building(tid) => {
                        assert!(
                            *tid != me,
                            "recursive singleton initialization of {}",
                            std::any::type_name::<T>()
                        );
                        Action::Wait
                    }
                },
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(Slot::Building(me));
                    Action::Build
                }
            }
        };

        match action {
            Action::Done(any) => {
                return any
                    .downcast_ref::<T>()
                    .expect("singleton slot holds the registered type");
            }
            Action::Build => {
                let instance: &'static T = Box::leak(Box::new(T::init()));
                at_exit_with_priority(move || instance.finalize(), T::TEARDOWN_PRIORITY);
                lock_slots().insert(TypeId::of::<T>(), Slot::Ready(instance));
                return instance;
            }
            Action::Wait => std::thread::yield_now(),
        }
    }
}

struct DefaultCell<T>(T);

impl<T: Default + Send + Sync + 'static> SingletonInit for DefaultCell<T> {
    fn init() -> Self {
        Self(T::default())
    }
}

/// A lazy, default-constructed shared instance of `T`.
pub fn default_instance<T: Default + Send + Sync + 'static>() -> &'static T {
    &singleton::<DefaultCell<T>>().0
}
