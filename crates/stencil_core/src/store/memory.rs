//! In-memory key-value store.
//!
//! # Responsibility
//! - Back tests and the CLI smoke probe without touching disk.
//! - Simulate capacity-bounded backends so write-failure paths are testable.

use crate::store::{KeyValueStore, StoreError, StoreResult};
use std::collections::BTreeMap;

/// Process-local map-backed store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    max_value_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects any single value larger than `max_value_bytes`, mimicking a
    /// quota-bounded backend.
    pub fn with_value_limit(max_value_bytes: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_value_bytes: Some(max_value_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        if let Some(limit) = self.max_value_bytes {
            if value.len() > limit {
                return Err(StoreError::CapacityExceeded {
                    key: key.to_string(),
                });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::store::{KeyValueStore, StoreError};

    #[test]
    fn set_get_remove_roundtrip() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v1").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v1"));

        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));

        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        store.remove("k").unwrap();
    }

    #[test]
    fn value_limit_rejects_oversized_writes() {
        let mut store = MemoryStore::with_value_limit(4);
        store.set("small", "ok").unwrap();

        let err = store.set("big", "too large").unwrap_err();
        assert!(matches!(err, StoreError::CapacityExceeded { key } if key == "big"));
        assert_eq!(store.get("big").unwrap(), None);
    }
}
