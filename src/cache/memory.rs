//! In-process cache with per-entry expiry.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{DocIndexError, Result};

use super::CacheClient;

/// In-process [`CacheClient`] backed by a `HashMap`.
///
/// Every write first evicts the entries whose TTL has lapsed, so the map
/// only holds entries written within the last TTL. Deadlines sit in a
/// min-heap, making eviction O(log n) per expired entry. Suitable for
/// single-process deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    store: Mutex<Store>,
}

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<String, Entry>,

    /// Expiry schedule, soonest first. Holds stale deadlines for keys that
    /// were overwritten or removed; those are skipped when popped.
    deadlines: BinaryHeap<Reverse<(Instant, String)>>,
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Store {
    fn evict_expired(&mut self, now: Instant) -> usize {
        let mut evicted = 0;
        while self
            .deadlines
            .peek()
            .is_some_and(|Reverse((deadline, _))| *deadline <= now)
        {
            let Some(Reverse((deadline, key))) = self.deadlines.pop() else {
                break;
            };
            let current = self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.expires_at == deadline);
            if current {
                self.entries.remove(&key);
                evicted += 1;
            }
        }
        evicted
    }
}

impl MemoryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries, including expired ones not
    /// evicted by a write yet.
    pub fn len(&self) -> usize {
        self.store.lock().map_or(0, |store| store.entries.len())
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired entry now. Returns how many were removed.
    ///
    /// Writes do this on their own; call it to release memory from a
    /// cache that has stopped receiving writes.
    pub fn purge_expired(&self) -> Result<usize> {
        Ok(self.lock()?.evict_expired(Instant::now()))
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<()> {
        let mut store = self.lock()?;
        store.entries.clear();
        store.deadlines.clear();
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| DocIndexError::cache("Memory cache lock poisoned"))
    }
}

impl CacheClient for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut store = self.lock()?;
        match store.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                store.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| DocIndexError::cache("TTL overflows the clock"))?;

        let mut store = self.lock()?;
        store.evict_expired(now);
        store.deadlines.push(Reverse((expires_at, key.to_string())));
        store.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.entries.remove(key).is_some())
    }
}
