use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;

use super::{RuleStore, StorageError};

/// In-memory store for tests and the deterministic simulation. Supports
/// failure injection so FSM rollback paths can be exercised.
#[derive(Default)]
pub struct MemoryRuleStore {
    entries: DashMap<String, Vec<u8>>,
    fail_next_put: AtomicBool,
    fail_next_delete: AtomicBool,
    puts: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_put(&self) {
        self.fail_next_put.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_delete(&self) {
        self.fail_next_delete.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }
}

impl RuleStore for MemoryRuleStore {
    fn put(&self, id: &str, bytes: &[u8]) -> Result<(), StorageError> {
        if self.fail_next_put.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(id.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StorageError> {
        if self.fail_next_delete.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.entries.remove(id);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.get(id).map(|e| e.value().clone()))
    }

    fn list(&self) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let mut entries: Vec<(String, Vec<u8>)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injected_put_failure_fires_once() {
        let store = MemoryRuleStore::new();
        store.fail_next_put();
        assert!(store.put("a", b"1").is_err());
        assert!(store.put("a", b"1").is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn injected_delete_failure_fires_once() {
        let store = MemoryRuleStore::new();
        store.put("a", b"1").unwrap();
        store.fail_next_delete();
        assert!(store.delete("a").is_err());
        assert_eq!(store.len(), 1);
        assert!(store.delete("a").is_ok());
        assert!(store.is_empty());
    }
}
