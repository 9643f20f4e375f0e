//! In-memory metric collection.
//!
//! [`MetricsCollector`] keeps a bounded [`MetricBuffer`] per metric name,
//! publishes the latest sample of every metric to the [`SnapshotStore`],
//! samples host resources through a [`ResourceProbe`], and computes
//! sliding-window [`Stats`].
//!
//! Store access is **best-effort** -- a failed or slow store is logged and
//! treated as a miss, never surfaced to producers.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use perfwatch_cache::{SnapshotStore, StoreStats};
use perfwatch_core::buffer::MetricBuffer;
use perfwatch_core::metric_names::{
    current_key, KEY_SYSTEM_CURRENT, METRIC_API_REQUESTS, METRIC_API_REQUEST_SIZE,
    METRIC_API_RESPONSE_SIZE, METRIC_API_RESPONSE_TIME, METRIC_CPU_PERCENT, METRIC_DISK_FREE,
    METRIC_DISK_PERCENT, METRIC_DISK_USED, METRIC_MEMORY_AVAILABLE, METRIC_MEMORY_PERCENT,
    METRIC_MEMORY_USED, METRIC_NETWORK_RECV, METRIC_NETWORK_SENT, STORE_NAMESPACE, UNIT_BYTES,
    UNIT_MILLIS, UNIT_PERCENT,
};
use perfwatch_core::sample::{MetricKind, MetricSample};
use perfwatch_core::stats::Stats;
use perfwatch_core::types::{cutoff, Tags, Timestamp};

use crate::config::MonitorConfig;
use crate::probe::{ProbeError, ResourceProbe};

/// Composite host snapshot published under `system:current`.
///
/// Each reading is optional: a probe that failed on this tick leaves its
/// fields empty while the others are still reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemResources {
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub memory_used: Option<u64>,
    pub memory_available: Option<u64>,
    pub disk_usage_percent: Option<f64>,
    pub disk_used: Option<u64>,
    pub disk_free: Option<u64>,
    pub network_bytes_sent: Option<u64>,
    pub network_bytes_recv: Option<u64>,
    pub timestamp: Timestamp,
}

impl SystemResources {
    /// `true` if every probe failed.
    pub fn is_empty(&self) -> bool {
        self.cpu_percent.is_none()
            && self.memory_percent.is_none()
            && self.disk_usage_percent.is_none()
            && self.network_bytes_sent.is_none()
    }
}

/// Bounded per-name sample history plus the snapshot-store publisher.
///
/// Safe to share via `Arc`; recording may happen from any number of tasks
/// while the monitor loop samples and evicts.
pub struct MetricsCollector {
    /// One buffer per metric name. A recorder locks its buffer before
    /// releasing the registry lock, so eviction never removes a buffer that
    /// is about to receive a push.
    buffers: RwLock<HashMap<String, Arc<Mutex<MetricBuffer>>>>,
    store: Arc<dyn SnapshotStore>,
    probe: Arc<dyn ResourceProbe>,
    config: MonitorConfig,
    /// When the last system sample with at least one reading was taken.
    last_system_check: RwLock<Option<Timestamp>>,
    /// Samples dropped because the metric-name cap was reached.
    rejected: AtomicU64,
}

impl MetricsCollector {
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn SnapshotStore>,
        probe: Arc<dyn ResourceProbe>,
    ) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            store,
            probe,
            config,
            last_system_check: RwLock::new(None),
            rejected: AtomicU64::new(0),
        }
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Record one observation stamped with the current time.
    pub async fn record(
        &self,
        name: &str,
        value: f64,
        kind: MetricKind,
        tags: Option<Tags>,
        unit: Option<&str>,
    ) {
        let mut sample = MetricSample::new(name, value, kind).with_tags(tags.unwrap_or_default());
        sample.unit = unit.map(str::to_string);
        self.record_sample(sample).await;
    }

    /// Record a pre-built sample, keeping its timestamp.
    ///
    /// A sample older than the buffer's newest is stored in timestamp order
    /// but not published, so `current:<name>` always holds the newest value.
    pub async fn record_sample(&self, sample: MetricSample) {
        let name = sample.name.clone();
        let value = sample.value;

        let Some(mut buffer) = self.buffer_for(&name).await else {
            let previously = self.rejected.fetch_add(1, Ordering::Relaxed);
            if previously == 0 {
                tracing::warn!(
                    metric = %name,
                    max_metrics = self.config.max_metrics,
                    "Metric name cap reached -- dropping samples for new metric names",
                );
            } else {
                tracing::debug!(metric = %name, "Dropping sample for new metric name (cap reached)");
            }
            return;
        };

        let newest = buffer.is_newest(&sample);
        let unit = sample.unit.clone();
        let snapshot = newest.then(|| serde_json::to_value(&sample));
        buffer.push(sample);

        // Published while the buffer lock is held, so concurrent recorders
        // of one metric publish in the order they appended.
        match snapshot {
            Some(Ok(json)) => {
                self.publish(
                    &current_key(&name),
                    json,
                    self.config.current_ttl,
                    &["metrics", "current"],
                )
                .await;
            }
            Some(Err(e)) => {
                tracing::warn!(metric = %name, error = %e, "Failed to serialise sample snapshot");
            }
            None => {
                tracing::debug!(metric = %name, "Late sample buffered without publishing");
            }
        }
        drop(buffer);

        tracing::debug!(
            metric = %name,
            value,
            unit = unit.as_deref().unwrap_or(""),
            "Recorded metric",
        );
    }

    /// Lock the buffer for `name`, creating it if the name cap allows.
    ///
    /// The buffer is locked before the registry lock is released, so
    /// eviction cannot drop it while the caller is about to push.
    async fn buffer_for(&self, name: &str) -> Option<OwnedMutexGuard<MetricBuffer>> {
        {
            let registry = self.buffers.read().await;
            if let Some(buffer) = registry.get(name) {
                return Some(Arc::clone(buffer).lock_owned().await);
            }
        }

        let mut registry = self.buffers.write().await;
        if !registry.contains_key(name) && registry.len() >= self.config.max_metrics {
            return None;
        }
        let capacity = self.config.buffer_capacity;
        let buffer = registry
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(MetricBuffer::new(capacity))));
        Some(Arc::clone(buffer).lock_owned().await)
    }

    /// Record the metrics derived from one handled API request.
    ///
    /// Sizes of `None` or `0` are not recorded.
    pub async fn record_api_event(
        &self,
        endpoint: &str,
        method: &str,
        response_time_ms: f64,
        status_code: u16,
        request_size: Option<u64>,
        response_size: Option<u64>,
    ) {
        let request_tags = Tags::from([
            ("endpoint".to_string(), endpoint.to_string()),
            ("method".to_string(), method.to_string()),
            ("status".to_string(), status_code.to_string()),
        ]);
        let size_tags = Tags::from([
            ("endpoint".to_string(), endpoint.to_string()),
            ("method".to_string(), method.to_string()),
        ]);

        self.record(
            METRIC_API_RESPONSE_TIME,
            response_time_ms,
            MetricKind::Timer,
            Some(request_tags.clone()),
            Some(UNIT_MILLIS),
        )
        .await;
        self.record(METRIC_API_REQUESTS, 1.0, MetricKind::Counter, Some(request_tags), None)
            .await;

        if let Some(size) = request_size.filter(|s| *s > 0) {
            self.record(
                METRIC_API_REQUEST_SIZE,
                size as f64,
                MetricKind::Histogram,
                Some(size_tags.clone()),
                Some(UNIT_BYTES),
            )
            .await;
        }
        if let Some(size) = response_size.filter(|s| *s > 0) {
            self.record(
                METRIC_API_RESPONSE_SIZE,
                size as f64,
                MetricKind::Histogram,
                Some(size_tags),
                Some(UNIT_BYTES),
            )
            .await;
        }
    }

    // -----------------------------------------------------------------------
    // System sampling
    // -----------------------------------------------------------------------

    /// Sample host resources, record each reading as its own metric and
    /// publish the composite snapshot.
    ///
    /// Probe failures are logged and skipped; whatever succeeded is still
    /// recorded. If nothing succeeded the snapshot is not published.
    pub async fn sample_system_resources(&self) -> SystemResources {
        let cpu = self.run_probe("cpu", |p| p.cpu_percent()).await;
        let memory = self.run_probe("memory", |p| p.memory()).await;
        let disk = self.run_probe("disk", |p| p.disk()).await;
        let network = self.run_probe("network", |p| p.network()).await;

        let snapshot = SystemResources {
            cpu_percent: cpu,
            memory_percent: memory.map(|m| m.percent),
            memory_used: memory.map(|m| m.used),
            memory_available: memory.map(|m| m.available),
            disk_usage_percent: disk.map(|d| d.percent),
            disk_used: disk.map(|d| d.used),
            disk_free: disk.map(|d| d.free),
            network_bytes_sent: network.map(|n| n.bytes_sent),
            network_bytes_recv: network.map(|n| n.bytes_recv),
            timestamp: Utc::now(),
        };

        if let Some(cpu) = cpu {
            self.gauge(METRIC_CPU_PERCENT, cpu, UNIT_PERCENT).await;
        }
        if let Some(m) = memory {
            self.gauge(METRIC_MEMORY_PERCENT, m.percent, UNIT_PERCENT).await;
            self.gauge(METRIC_MEMORY_USED, m.used as f64, UNIT_BYTES).await;
            self.gauge(METRIC_MEMORY_AVAILABLE, m.available as f64, UNIT_BYTES).await;
        }
        if let Some(d) = disk {
            self.gauge(METRIC_DISK_PERCENT, d.percent, UNIT_PERCENT).await;
            self.gauge(METRIC_DISK_USED, d.used as f64, UNIT_BYTES).await;
            self.gauge(METRIC_DISK_FREE, d.free as f64, UNIT_BYTES).await;
        }
        if let Some(n) = network {
            self.counter(METRIC_NETWORK_SENT, n.bytes_sent as f64, UNIT_BYTES).await;
            self.counter(METRIC_NETWORK_RECV, n.bytes_recv as f64, UNIT_BYTES).await;
        }

        if snapshot.is_empty() {
            tracing::warn!("System sampling produced no readings -- skipping snapshot");
            return snapshot;
        }

        match serde_json::to_value(&snapshot) {
            Ok(json) => {
                self.publish(
                    KEY_SYSTEM_CURRENT,
                    json,
                    self.config.system_ttl,
                    &["system", "current"],
                )
                .await;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialise system snapshot"),
        }
        *self.last_system_check.write().await = Some(snapshot.timestamp);

        snapshot
    }

    async fn gauge(&self, name: &str, value: f64, unit: &str) {
        self.record(name, value, MetricKind::Gauge, None, Some(unit)).await;
    }

    async fn counter(&self, name: &str, value: f64, unit: &str) {
        self.record(name, value, MetricKind::Counter, None, Some(unit)).await;
    }

    /// Run one probe call on the blocking pool, bounded by `probe_timeout`.
    async fn run_probe<T, F>(&self, what: &'static str, call: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ResourceProbe) -> Result<T, ProbeError> + Send + 'static,
    {
        let probe = Arc::clone(&self.probe);
        let timeout = self.config.probe_timeout;
        let task = tokio::task::spawn_blocking(move || call(probe.as_ref()));

        let result = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(reading)) => reading,
            Ok(Err(e)) => Err(ProbeError::Task(e.to_string())),
            Err(_) => Err(ProbeError::TimedOut(timeout)),
        };

        match result {
            Ok(reading) => Some(reading),
            Err(e) => {
                tracing::warn!(probe = what, error = %e, "System probe failed -- skipping reading");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Statistics & retention
    // -----------------------------------------------------------------------

    /// Statistics over samples of `name` from the last `window`.
    ///
    /// `None` if the metric is unknown or has no samples in the window.
    pub async fn statistics(&self, name: &str, window: Duration) -> Option<Stats> {
        self.statistics_at(name, window, Utc::now()).await
    }

    /// [`statistics`](Self::statistics) against an explicit clock.
    pub async fn statistics_at(&self, name: &str, window: Duration, now: Timestamp) -> Option<Stats> {
        let registry = self.buffers.read().await;
        let buffer = registry.get(name)?;
        let values = buffer.lock().await.values_since(cutoff(now, window));
        drop(registry);
        Stats::from_values(&values)
    }

    /// Statistics over the trending window for every tracked metric.
    ///
    /// Metrics with no samples in the window are omitted.
    pub async fn trending(&self) -> BTreeMap<String, Stats> {
        let now = Utc::now();
        let mut trending = BTreeMap::new();
        for name in self.metric_names().await {
            if let Some(stats) = self.statistics_at(&name, self.config.trending_window, now).await {
                trending.insert(name, stats);
            }
        }
        trending
    }

    /// Drop samples older than `retention` from every buffer.
    ///
    /// Buffers left empty are removed, freeing their slot under the
    /// metric-name cap. Returns the number of samples evicted.
    pub async fn evict_expired(&self, retention: Duration) -> usize {
        self.evict_expired_at(retention, Utc::now()).await
    }

    /// [`evict_expired`](Self::evict_expired) against an explicit clock.
    pub async fn evict_expired_at(&self, retention: Duration, now: Timestamp) -> usize {
        let cutoff = cutoff(now, retention);
        let mut registry = self.buffers.write().await;

        let mut evicted = 0;
        let mut emptied = Vec::new();
        for (name, buffer) in registry.iter() {
            let mut buffer = buffer.lock().await;
            evicted += buffer.evict_before(cutoff);
            if buffer.is_empty() {
                emptied.push(name.clone());
            }
        }
        for name in &emptied {
            registry.remove(name);
        }

        if evicted > 0 {
            tracing::debug!(evicted, buffers_removed = emptied.len(), "Evicted expired samples");
        }
        evicted
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    /// Names of every metric with a buffer, sorted.
    pub async fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.buffers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Copy of the buffered samples of `name`, oldest first.
    pub async fn samples(&self, name: &str) -> Vec<MetricSample> {
        let registry = self.buffers.read().await;
        let samples = match registry.get(name) {
            Some(buffer) => buffer.lock().await.iter().cloned().collect(),
            None => Vec::new(),
        };
        samples
    }

    /// Latest published value of `metric_name`, read from the store.
    pub async fn current_value(&self, metric_name: &str) -> Option<f64> {
        self.fetch(&current_key(metric_name))
            .await?
            .get("value")
            .and_then(serde_json::Value::as_f64)
    }

    /// Latest published composite system snapshot.
    pub async fn system_snapshot(&self) -> Option<SystemResources> {
        let json = self.fetch(KEY_SYSTEM_CURRENT).await?;
        match serde_json::from_value(json) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(error = %e, "Malformed system snapshot in store");
                None
            }
        }
    }

    pub async fn last_system_check(&self) -> Option<Timestamp> {
        *self.last_system_check.read().await
    }

    /// Samples dropped because the metric-name cap was reached.
    pub fn rejected_samples(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub async fn store_stats(&self) -> Option<StoreStats> {
        match tokio::time::timeout(self.config.store_timeout, self.store.stats()).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Snapshot store stats unavailable");
                None
            }
            Err(_) => {
                tracing::warn!("Snapshot store stats timed out");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Store access
    // -----------------------------------------------------------------------

    /// Best-effort write; returns whether the store accepted it.
    pub(crate) async fn publish(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
        tags: &[&str],
    ) -> bool {
        let write = self.store.set(STORE_NAMESPACE, key, value, ttl, tags);
        match tokio::time::timeout(self.config.store_timeout, write).await {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(e)) => {
                tracing::warn!(key, error = %e, "Snapshot publish failed");
                false
            }
            Err(_) => {
                tracing::warn!(key, "Snapshot publish timed out");
                false
            }
        }
    }

    /// Best-effort read; errors and timeouts read as a miss.
    async fn fetch(&self, key: &str) -> Option<serde_json::Value> {
        let read = self.store.get(STORE_NAMESPACE, key);
        match tokio::time::timeout(self.config.store_timeout, read).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                tracing::warn!(key, error = %e, "Snapshot read failed -- treating as miss");
                None
            }
            Err(_) => {
                tracing::warn!(key, "Snapshot read timed out -- treating as miss");
                None
            }
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}
