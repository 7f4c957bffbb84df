//! # courier-storage: message storage for courier
//!
//! The [`Storage`] trait is the contract every back-end implements: three
//! operations plus a declared lock discipline. [`GuardedStorage`] wraps a
//! back-end with a lock of the kind it asks for and is what the server
//! shares across its workers. [`open_storage`] is the back-end factory
//! standing in for the original dynamic-plugin boundary: it owns creation,
//! and teardown rides on drop.

mod guarded;
mod memory;

pub use guarded::GuardedStorage;
pub use memory::MemoryStorage;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use courier_types::Message;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors surfaced by storage back-ends and the factory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The back-end failed an operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// No back-end is registered under the requested name.
    #[error("unknown storage backend `{0}`")]
    UnknownBackend(String),
}

/// Lock discipline a back-end expects its caller to enforce.
///
/// A back-end declaring [`LockKind::None`] must be internally thread-safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    /// No external locking required.
    None,
    /// Serialize calls through a spin lock.
    Spin,
    /// Serialize calls through a mutex.
    Mutex,
}

/// The storage contract.
///
/// `store` materializes one indexable row per addressee, all sharing the
/// message's canonical `to` list, which is what makes `load` a point lookup
/// per addressee. `load` withholds future-dated messages until their
/// timestamp; `load_sent` does not apply the cutoff — a sender always sees
/// their own messages.
pub trait Storage: Send {
    /// Appends one message and returns its assigned UID.
    fn store(&mut self, message: &Message) -> StorageResult<u64>;

    /// Returns every stored message addressed to any of `addressees` whose
    /// send timestamp is not in the future, in unspecified order.
    fn load(&mut self, addressees: &[String]) -> StorageResult<Vec<Message>>;

    /// Returns every stored message sent by `user`, in unspecified order.
    fn load_sent(&mut self, user: &str) -> StorageResult<Vec<Message>>;

    /// The lock discipline this back-end requires of its caller.
    fn required_lock_kind(&self) -> LockKind {
        LockKind::None
    }
}

/// Server-clock unix seconds, the visibility cutoff for [`Storage::load`].
pub fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Opens the back-end registered under `backend` and wraps it with its
/// declared lock discipline. `config_path` is handed to back-ends that take
/// one; the in-memory back-end ignores it.
pub fn open_storage(backend: &str, config_path: &Path) -> StorageResult<GuardedStorage> {
    let _ = config_path;
    match backend {
        "memory" => Ok(GuardedStorage::new(Box::new(MemoryStorage::new()))),
        other => Err(StorageError::UnknownBackend(other.to_string())),
    }
}
