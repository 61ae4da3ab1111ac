//! In-process [`DurableStore`] backed by an ordered map.

use std::collections::BTreeMap;
use std::sync::Mutex;

use cadence_core::{DurableStore, StoreError};

/// A [`DurableStore`] that lives in memory and is shared via `Arc`.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.blobs.lock().expect("memory store poisoned")
    }

    /// All keys starting with `prefix`, in ascending order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.blobs()
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Whether a blob is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.blobs().contains_key(key)
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs().is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.blobs()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { key: key.into() })
    }

    fn save(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.blobs().insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.blobs().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load("partition/p1"),
            Err(StoreError::NotFound { key }) if key == "partition/p1"
        ));
    }

    #[test]
    fn save_replaces_and_delete_is_idempotent() {
        let store = MemoryStore::new();
        store.save("k", b"one").unwrap();
        store.save("k", b"two").unwrap();
        assert_eq!(store.load("k").unwrap(), b"two");
        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn prefix_listing_is_exact() {
        let store = MemoryStore::new();
        for key in ["effect/5/p1/a1", "effect/5/p2/a3", "effect/50/p1/a1", "partition/p1"] {
            store.save(key, b"").unwrap();
        }
        assert_eq!(
            store.keys_with_prefix("effect/5/"),
            vec!["effect/5/p1/a1".to_string(), "effect/5/p2/a3".to_string()]
        );
        assert_eq!(store.keys_with_prefix("actor/"), Vec::<String>::new());
    }
}
