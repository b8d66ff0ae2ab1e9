use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::{KeyValueStore, Result, StoreError};

/// In-process store. Clones share the same map, so a test can hand one clone
/// to the tracker and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `entries`; seeding does not count as writes.
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Arc::new(Mutex::new(map)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of successful `set` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| StoreError::unavailable("memory store poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| StoreError::unavailable("memory store poisoned"))?;
        guard.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| StoreError::unavailable("memory store poisoned"))?;
        Ok(guard.keys().cloned().collect())
    }
}
