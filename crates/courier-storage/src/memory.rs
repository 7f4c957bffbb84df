//! In-memory storage back-end.

use std::collections::{BTreeMap, HashMap};

use courier_runtime::AtomicCounter;
use courier_types::Message;

use crate::{now_unix_seconds, LockKind, Storage, StorageError, StorageResult};

/// Fan-out storage in process memory.
///
/// One row per addressee, keyed `(send_ts, uid)` so rows stay ordered by
/// timestamp and the visibility cutoff is a range scan. All rows of a
/// message share its canonical `to` list. Declares [`LockKind::Mutex`]: the
/// maps are not internally synchronized.
pub struct MemoryStorage {
    uid_counter: AtomicCounter,
    rows: HashMap<String, BTreeMap<(u64, u64), Message>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            uid_counter: AtomicCounter::new(0),
            rows: HashMap::new(),
        }
    }

    /// Total number of per-addressee rows, across all addressees.
    pub fn row_count(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn store(&mut self, message: &Message) -> StorageResult<u64> {
        let uid = self.uid_counter.fetch_inc() as u64;
        let mut copy = message.clone();
        copy.uid = Some(uid);
        for addressee in &message.to {
            self.rows
                .entry(addressee.clone())
                .or_default()
                .insert((copy.send_ts, uid), copy.clone());
        }
        Ok(uid)
    }

    fn load(&mut self, addressees: &[String]) -> StorageResult<Vec<Message>> {
        let cutoff = now_unix_seconds();
        let mut result = Vec::new();
        for addressee in addressees {
            if let Some(rows) = self.rows.get(addressee) {
                result.extend(rows.range(..=(cutoff, u64::MAX)).map(|(_, m)| m.clone()));
            }
        }
        Ok(result)
    }

    fn load_sent(&mut self, user: &str) -> StorageResult<Vec<Message>> {
        // fan-out rows duplicate multi-addressee messages; collapse by uid
        let mut by_uid = BTreeMap::new();
        for rows in self.rows.values() {
            for message in rows.values() {
                if message.from == user {
                    let uid = message.uid.ok_or_else(|| {
                        StorageError::Backend("stored message lost its uid".to_string())
                    })?;
                    by_uid.insert(uid, message.clone());
                }
            }
        }
        Ok(by_uid.into_values().collect())
    }

    fn required_lock_kind(&self) -> LockKind {
        LockKind::Mutex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to(addressees: &[&str]) -> Vec<String> {
        addressees.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn basic_send_receive() {
        let mut storage = MemoryStorage::new();
        storage
            .store(&Message::new("u1", to(&["u2"]), 10, "hello"))
            .expect("store");

        let loaded = storage.load(&to(&["u2"])).expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].from, "u1");
        assert_eq!(loaded[0].body, "hello");
        assert!(loaded[0].uid.is_some());
    }

    #[test]
    fn multi_addressee_fan_out() {
        let mut storage = MemoryStorage::new();
        storage
            .store(&Message::new("u2", to(&["u2", "u3"]), 20, "hi"))
            .expect("store");

        assert_eq!(storage.load(&to(&["u2"])).expect("load").len(), 1);
        assert_eq!(storage.load(&to(&["u3"])).expect("load").len(), 1);

        let both = storage.load(&to(&["u2", "u3"])).expect("load");
        assert_eq!(both.len(), 2);
        for row in &both {
            assert_eq!(row.to, to(&["u2", "u3"]), "rows share the canonical to list");
        }
    }

    // Future-dated messages are withheld from load but visible to the
    // sender.
    #[test]
    fn future_dated_messages_are_withheld() {
        let mut storage = MemoryStorage::new();
        let future_ts = now_unix_seconds() + 2000;
        storage
            .store(&Message::new("a", to(&["b"]), future_ts, "x"))
            .expect("store");

        assert!(storage.load(&to(&["b"])).expect("load").is_empty());
        let sent = storage.load_sent("a").expect("load_sent");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "x");
    }

    #[test]
    fn past_messages_are_visible() {
        let mut storage = MemoryStorage::new();
        let now = now_unix_seconds();
        storage
            .store(&Message::new("a", to(&["b"]), now, "on time"))
            .expect("store");
        storage
            .store(&Message::new("a", to(&["b"]), now.saturating_sub(100), "old"))
            .expect("store");

        assert_eq!(storage.load(&to(&["b"])).expect("load").len(), 2);
    }

    #[test]
    fn uids_are_unique_and_assigned_on_store() {
        let mut storage = MemoryStorage::new();
        let a = storage
            .store(&Message::new("a", to(&["x"]), 1, "m1"))
            .expect("store");
        let b = storage
            .store(&Message::new("a", to(&["x"]), 1, "m2"))
            .expect("store");
        assert_ne!(a, b);

        // identical timestamps do not collide
        assert_eq!(storage.load(&to(&["x"])).expect("load").len(), 2);
    }

    #[test]
    fn load_sent_collapses_fan_out_rows() {
        let mut storage = MemoryStorage::new();
        storage
            .store(&Message::new("u2", to(&["u2", "u3", "@ops"]), 20, "hi"))
            .expect("store");

        assert_eq!(storage.row_count(), 3);
        let sent = storage.load_sent("u2").expect("load_sent");
        assert_eq!(sent.len(), 1, "one message, not one per row");
    }

    #[test]
    fn load_of_unknown_addressee_is_empty() {
        let mut storage = MemoryStorage::new();
        assert!(storage.load(&to(&["nobody"])).expect("load").is_empty());
        assert!(storage.load_sent("nobody").expect("load_sent").is_empty());
    }
}
