//! Lock-discipline wrapper around a storage back-end.

use std::sync::Mutex as StdMutex;

use courier_runtime::{guard, Mutex, SpinLock};
use courier_types::Message;

use crate::{LockKind, Storage, StorageResult};

/// Owns a back-end and interposes the lock it declared around every call.
///
/// A [`LockKind::None`] back-end is called without taking the discipline
/// lock. The inner cell that hands out `&mut` access is uncontended
/// whenever a discipline lock is in force; for `None` back-ends it is the
/// only serialization point and merely provides the exclusive reference —
/// such back-ends declared themselves thread-safe.
pub struct GuardedStorage {
    kind: LockKind,
    spin: SpinLock,
    mutex: Mutex,
    backend: StdMutex<Box<dyn Storage>>,
}

impl GuardedStorage {
    /// Wraps `backend`, reading its declared lock kind once up front.
    pub fn new(backend: Box<dyn Storage>) -> Self {
        let kind = backend.required_lock_kind();
        Self {
            kind,
            spin: SpinLock::new(),
            mutex: Mutex::new(),
            backend: StdMutex::new(backend),
        }
    }

    /// The discipline in force.
    pub fn lock_kind(&self) -> LockKind {
        self.kind
    }

    fn with_backend<R>(&self, f: impl FnOnce(&mut dyn Storage) -> R) -> R {
        match self.kind {
            LockKind::None => self.call(f),
            LockKind::Spin => {
                let _g = guard(&self.spin);
                self.call(f)
            }
            LockKind::Mutex => {
                let _g = guard(&self.mutex);
                self.call(f)
            }
        }
    }

    fn call<R>(&self, f: impl FnOnce(&mut dyn Storage) -> R) -> R {
        let mut backend = self
            .backend
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut **backend)
    }

    /// [`Storage::store`] under the declared lock.
    pub fn store(&self, message: &Message) -> StorageResult<u64> {
        self.with_backend(|backend| backend.store(message))
    }

    /// [`Storage::load`] under the declared lock.
    pub fn load(&self, addressees: &[String]) -> StorageResult<Vec<Message>> {
        self.with_backend(|backend| backend.load(addressees))
    }

    /// [`Storage::load_sent`] under the declared lock.
    pub fn load_sent(&self, user: &str) -> StorageResult<Vec<Message>> {
        self.with_backend(|backend| backend.load_sent(user))
    }
}
