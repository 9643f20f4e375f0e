use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Snapshot store unavailable: {0}")]
    Unavailable(String),
}

/// Counters reported by a store, surfaced on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Percentage of reads that hit, rounded to two decimals.
    pub hit_rate: f64,
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub invalidations: u64,
    /// Live (possibly not yet swept) entries.
    pub entries: usize,
}

/// A namespaced key/value cache with per-entry TTL and tag grouping.
///
/// Values are JSON documents. Implementations must be safe to share via
/// `Arc<dyn SnapshotStore>` across tasks.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store `value` under `namespace:key` for `ttl`, grouped under `tags`.
    ///
    /// Returns `Ok(false)` if the store declined the write.
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
        tags: &[&str],
    ) -> Result<bool, StoreError>;

    /// Fetch a live entry. Expired entries read as `None`.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Remove an entry, returning whether it existed.
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError>;

    /// Remove every entry carrying `tag`, returning how many were dropped.
    async fn invalidate_tag(&self, tag: &str) -> Result<usize, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
