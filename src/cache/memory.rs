//! In-process cache store
//!
//! Same contract and quota semantics as the SQLite store, without touching
//! disk. Used for tests and for embedding the controller in short-lived
//! processes.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::storage::{CacheNameStats, CacheStats, CacheStore, Result, StoredEntry};
use crate::error::CacheError;

type Caches = BTreeMap<String, HashMap<String, StoredEntry>>;

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    caches: Mutex<Caches>,
    quota_bytes: Option<u64>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: u64) -> Self {
        Self {
            caches: Mutex::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Caches>> {
        self.caches
            .lock()
            .map_err(|_| CacheError::Io("memory cache lock poisoned".to_string()))
    }
}

fn used_bytes(caches: &Caches) -> u64 {
    caches
        .values()
        .flat_map(|entries| entries.values())
        .map(|e| e.body.len() as u64)
        .sum()
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, cache: &str, key: &str) -> Result<Option<StoredEntry>> {
        let caches = self.lock()?;
        Ok(caches.get(cache).and_then(|c| c.get(key)).cloned())
    }

    fn put(&self, cache: &str, key: &str, entry: &StoredEntry) -> Result<()> {
        let mut caches = self.lock()?;

        if let Some(quota) = self.quota_bytes {
            let reclaimed = caches
                .get(cache)
                .and_then(|c| c.get(key))
                .map(|e| e.body.len() as u64)
                .unwrap_or(0);
            let size = entry.body.len() as u64;
            if used_bytes(&caches).saturating_sub(reclaimed) + size > quota {
                return Err(CacheError::QuotaExceeded {
                    cache: cache.to_string(),
                    bytes: entry.body.len(),
                });
            }
        }

        caches
            .entry(cache.to_string())
            .or_default()
            .insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn delete(&self, cache: &str, key: &str) -> Result<bool> {
        let mut caches = self.lock()?;
        Ok(caches
            .get_mut(cache)
            .map(|c| c.remove(key).is_some())
            .unwrap_or(false))
    }

    fn cache_names(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn delete_cache(&self, cache: &str) -> Result<usize> {
        Ok(self.lock()?.remove(cache).map(|c| c.len()).unwrap_or(0))
    }

    fn stats(&self) -> Result<CacheStats> {
        let caches = self.lock()?;
        let per_cache = caches
            .iter()
            .map(|(name, entries)| CacheNameStats {
                name: name.clone(),
                entries: entries.len(),
                size_bytes: entries.values().map(|e| e.body.len()).sum(),
                oldest_entry: entries.values().map(|e| e.stored_at).min(),
                newest_entry: entries.values().map(|e| e.stored_at).max(),
            })
            .collect();
        Ok(CacheStats::from_caches(per_cache, self.quota_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(body: &[u8]) -> StoredEntry {
        StoredEntry {
            url: "http://localhost:3000/api/progress".to_string(),
            method: "GET".to_string(),
            status: 200,
            headers: Vec::new(),
            body: body.to_vec(),
            stored_at: Utc::now(),
        }
    }

    #[test]
    fn test_put_get_delete() {
        let store = MemoryCacheStore::new();
        store.put("runtime", "k", &entry(b"data")).unwrap();

        assert_eq!(store.get("runtime", "k").unwrap().unwrap().body, b"data");
        assert!(store.get("static", "k").unwrap().is_none());
        assert!(store.delete("runtime", "k").unwrap());
        assert!(store.get("runtime", "k").unwrap().is_none());
    }

    #[test]
    fn test_quota() {
        let store = MemoryCacheStore::with_quota(8);
        store.put("a", "k1", &entry(b"12345")).unwrap();
        assert!(matches!(
            store.put("b", "k2", &entry(b"12345")),
            Err(CacheError::QuotaExceeded { .. })
        ));
    }

    #[test]
    fn test_clear_all_uses_default_impl() {
        let store = MemoryCacheStore::new();
        store.put("a", "k1", &entry(b"1")).unwrap();
        store.put("b", "k1", &entry(b"2")).unwrap();
        store.put("b", "k2", &entry(b"3")).unwrap();

        assert_eq!(store.clear_all().unwrap().entries_removed, 3);
        assert!(store.cache_names().unwrap().is_empty());
    }
}
