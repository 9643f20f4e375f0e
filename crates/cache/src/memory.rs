//! In-process [`SnapshotStore`] backed by a `HashMap`.
//!
//! Expiry is checked lazily on read; [`MemoryStore::purge_expired`] sweeps
//! the whole map for callers that want to bound memory between reads.
//! Time is measured with `tokio::time::Instant`, so tests running on a
//! paused runtime can advance past a TTL.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::store::{SnapshotStore, StoreError, StoreStats};

struct Entry {
    data: serde_json::Value,
    /// `None` for entries stored with a zero TTL (no expiry).
    expires_at: Option<Instant>,
    tags: Vec<String>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Entries plus the tag -> keys index, kept consistent under one lock.
#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    tag_index: HashMap<String, HashSet<String>>,
}

impl Inner {
    fn insert(&mut self, key: String, entry: Entry) {
        self.remove(&key);
        for tag in &entry.tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        self.entries.insert(key, entry);
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        for tag in &entry.tags {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
        Some(entry)
    }

    fn remove_tagged(&mut self, tag: &str) -> usize {
        let Some(keys) = self.tag_index.remove(tag) else {
            return 0;
        };
        keys.iter().filter(|key| self.remove(key).is_some()).count()
    }

    fn remove_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    invalidations: AtomicU64,
}

/// Thread-safe TTL cache; wrap in `Arc` and share.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    counters: Counters,
}

fn full_key(namespace: &str, key: &str) -> String {
    format!("{namespace}:{key}")
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let purged = self.inner.write().await.remove_expired(Instant::now());
        if purged > 0 {
            tracing::debug!(purged, "Snapshot store: purged expired entries");
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
        tags: &[&str],
    ) -> Result<bool, StoreError> {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };

        let entry = Entry {
            data: value,
            expires_at,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
        };

        self.inner
            .write()
            .await
            .insert(full_key(namespace, key), entry);
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let full = full_key(namespace, key);
        let now = Instant::now();

        {
            let inner = self.inner.read().await;
            match inner.entries.get(&full) {
                Some(entry) if !entry.is_expired(now) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(entry.data.clone()));
                }
                Some(_) => {}
                None => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    return Ok(None);
                }
            }
        }

        // Expired: drop it, unless a writer replaced it in the meantime.
        let mut inner = self.inner.write().await;
        if inner.entries.get(&full).is_some_and(|e| e.is_expired(now)) {
            inner.remove(&full);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
        let removed = self
            .inner
            .write()
            .await
            .remove(&full_key(namespace, key))
            .is_some();
        if removed {
            self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<usize, StoreError> {
        let removed = self.inner.write().await.remove_tagged(tag);
        self.counters
            .invalidations
            .fetch_add(removed as u64, Ordering::Relaxed);
        Ok(removed)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let total_requests = hits + misses;
        let hit_rate = if total_requests == 0 {
            0.0
        } else {
            ((hits as f64 / total_requests as f64) * 100.0 * 100.0).round() / 100.0
        };

        Ok(StoreStats {
            hit_rate,
            total_requests,
            hits,
            misses,
            sets: self.counters.sets.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            entries: self.inner.read().await.entries.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
