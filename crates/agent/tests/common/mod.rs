#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use perfwatch_agent::collector::MetricsCollector;
use perfwatch_agent::config::MonitorConfig;
use perfwatch_agent::probe::{DiskReading, MemoryReading, NetworkReading, ProbeError, ResourceProbe};
use perfwatch_cache::{MemoryStore, SnapshotStore, StoreError, StoreStats};

/// Build a test `MonitorConfig` with short timeouts so failing
/// dependencies do not slow the suite down.
pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        interval: Duration::from_millis(20),
        probe_timeout: Duration::from_millis(500),
        store_timeout: Duration::from_millis(200),
        ..MonitorConfig::default()
    }
}

pub fn collector_with(
    config: MonitorConfig,
    store: Arc<dyn SnapshotStore>,
    probe: Arc<dyn ResourceProbe>,
) -> Arc<MetricsCollector> {
    Arc::new(MetricsCollector::new(config, store, probe))
}

/// Collector backed by a fresh `MemoryStore` and a healthy `FakeProbe`.
pub fn memory_collector(config: MonitorConfig) -> (Arc<MetricsCollector>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let collector = collector_with(config, store.clone(), Arc::new(FakeProbe::healthy()));
    (collector, store)
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

/// Scripted probe returning fixed readings, with per-reading failures.
pub struct FakeProbe {
    pub cpu: Option<f64>,
    pub memory: Option<MemoryReading>,
    pub disk: Option<DiskReading>,
    pub network: Option<NetworkReading>,
    /// Blocks every CPU call for this long.
    pub cpu_delay: Option<Duration>,
    pub cpu_calls: AtomicUsize,
}

impl FakeProbe {
    pub fn healthy() -> Self {
        Self {
            cpu: Some(42.5),
            memory: Some(MemoryReading {
                used: 6 * 1024 * 1024 * 1024,
                available: 2 * 1024 * 1024 * 1024,
                percent: 75.0,
            }),
            disk: Some(DiskReading {
                used: 400_000_000_000,
                free: 100_000_000_000,
                percent: 80.0,
            }),
            network: Some(NetworkReading {
                bytes_sent: 1_000_000,
                bytes_recv: 3_000_000,
            }),
            cpu_delay: None,
            cpu_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_cpu(cpu: f64) -> Self {
        Self {
            cpu: Some(cpu),
            ..Self::healthy()
        }
    }

    pub fn failing() -> Self {
        Self {
            cpu: None,
            memory: None,
            disk: None,
            network: None,
            ..Self::healthy()
        }
    }

    pub fn cpu_calls(&self) -> usize {
        self.cpu_calls.load(Ordering::SeqCst)
    }
}

impl ResourceProbe for FakeProbe {
    fn cpu_percent(&self) -> Result<f64, ProbeError> {
        self.cpu_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.cpu_delay {
            std::thread::sleep(delay);
        }
        self.cpu.ok_or(ProbeError::Unsupported("cpu"))
    }

    fn memory(&self) -> Result<MemoryReading, ProbeError> {
        self.memory.ok_or(ProbeError::Unsupported("memory"))
    }

    fn disk(&self) -> Result<DiskReading, ProbeError> {
        self.disk.ok_or_else(|| {
            ProbeError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "no such mount"))
        })
    }

    fn network(&self) -> Result<NetworkReading, ProbeError> {
        self.network.ok_or(ProbeError::Unsupported("network"))
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Store whose every call fails, as if the backend were down.
pub struct UnreachableStore;

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl SnapshotStore for UnreachableStore {
    async fn set(
        &self,
        _namespace: &str,
        _key: &str,
        _value: serde_json::Value,
        _ttl: Duration,
        _tags: &[&str],
    ) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn get(&self, _namespace: &str, _key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Err(down())
    }

    async fn delete(&self, _namespace: &str, _key: &str) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn invalidate_tag(&self, _tag: &str) -> Result<usize, StoreError> {
        Err(down())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Err(down())
    }
}

/// Store that panics on every write, used to fault a monitor tick.
pub struct PanickingStore;

#[async_trait]
impl SnapshotStore for PanickingStore {
    async fn set(
        &self,
        _namespace: &str,
        key: &str,
        _value: serde_json::Value,
        _ttl: Duration,
        _tags: &[&str],
    ) -> Result<bool, StoreError> {
        panic!("store write exploded for {key}");
    }

    async fn get(&self, _namespace: &str, _key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(None)
    }

    async fn delete(&self, _namespace: &str, _key: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn invalidate_tag(&self, _tag: &str) -> Result<usize, StoreError> {
        Ok(0)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats::default())
    }
}

/// `MemoryStore` that stalls writes whose `value` field equals `slow_value`.
pub struct SlowWriteStore {
    pub inner: MemoryStore,
    pub slow_value: f64,
    pub delay: Duration,
}

impl SlowWriteStore {
    pub fn new(slow_value: f64, delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            slow_value,
            delay,
        }
    }
}

#[async_trait]
impl SnapshotStore for SlowWriteStore {
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
        tags: &[&str],
    ) -> Result<bool, StoreError> {
        if value.get("value").and_then(serde_json::Value::as_f64) == Some(self.slow_value) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.set(namespace, key, value, ttl, tags).await
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.inner.get(namespace, key).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(namespace, key).await
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<usize, StoreError> {
        self.inner.invalidate_tag(tag).await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.inner.stats().await
    }
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
