//! Periodic monitoring loop and dashboard assembly.
//!
//! [`PerformanceMonitor`] owns a [`MetricsCollector`] and an
//! [`AlertManager`] and drives both from a single background task. The
//! application constructs one monitor at startup, calls
//! [`start`](PerformanceMonitor::start), and calls
//! [`stop`](PerformanceMonitor::stop) during shutdown.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use perfwatch_cache::{SnapshotStore, StoreStats};
use perfwatch_core::alert::{default_rules, AlertEvent, AlertRule};
use perfwatch_core::error::CoreError;
use perfwatch_core::stats::Stats;
use perfwatch_core::types::Timestamp;

use crate::alerts::AlertManager;
use crate::collector::{MetricsCollector, SystemResources};
use crate::config::MonitorConfig;
use crate::probe::ResourceProbe;

/// Window of alerts shown on the dashboard.
const DASHBOARD_ALERT_WINDOW: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("Monitor interval must be greater than zero")]
    InvalidInterval,

    #[error("Invalid alert rule: {0}")]
    Rule(#[from] CoreError),
}

/// Lifecycle state of the background loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Stopped,
    Running,
}

/// Point-in-time aggregate served to the dashboard.
///
/// Any section whose source is unavailable is `None` or empty.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub system_resources: Option<SystemResources>,
    pub trending_metrics: BTreeMap<String, Stats>,
    pub recent_alerts: Vec<AlertEvent>,
    pub store_performance: Option<StoreStats>,
    pub monitoring_status: MonitoringStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitoringStatus {
    pub active: bool,
    /// `None` until the first system sample succeeds.
    pub last_check: Option<Timestamp>,
    pub rules_configured: usize,
}

/// Internal bookkeeping for the running loop.
struct MonitorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Orchestrates periodic sampling, alert evaluation and retention.
pub struct PerformanceMonitor {
    collector: Arc<MetricsCollector>,
    alerts: Arc<AlertManager>,
    retention: Duration,
    /// `Some` while running. Held across `stop`'s join so start/stop
    /// never overlap.
    task: Mutex<Option<MonitorTask>>,
}

impl PerformanceMonitor {
    /// Build a stopped monitor with the default alert rules registered.
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn SnapshotStore>,
        probe: Arc<dyn ResourceProbe>,
    ) -> Result<Self, MonitorError> {
        let alerts = AlertManager::with_rules(&config, default_rules())?;
        let retention = config.retention;
        let collector = MetricsCollector::new(config, store, probe);

        Ok(Self {
            collector: Arc::new(collector),
            alerts: Arc::new(alerts),
            retention,
            task: Mutex::new(None),
        })
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    /// Register an additional rule; allowed before or after `start`.
    pub async fn register_rule(&self, rule: AlertRule) -> Result<(), MonitorError> {
        self.alerts.register(rule).await?;
        Ok(())
    }

    pub async fn state(&self) -> MonitorState {
        match self.task.lock().await.as_ref() {
            Some(task) if !task.handle.is_finished() => MonitorState::Running,
            _ => MonitorState::Stopped,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == MonitorState::Running
    }

    /// Spawn the monitoring loop. No-op if it is already running.
    pub async fn start(&self, interval: Duration) -> Result<(), MonitorError> {
        if interval.is_zero() {
            return Err(MonitorError::InvalidInterval);
        }

        let mut slot = self.task.lock().await;
        if slot.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            tracing::debug!("Performance monitoring already running");
            return Ok(());
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.collector),
            Arc::clone(&self.alerts),
            self.retention,
            interval,
            cancel.clone(),
        ));
        *slot = Some(MonitorTask { cancel, handle });

        tracing::info!(interval_secs = interval.as_secs_f64(), "Performance monitoring started");
        Ok(())
    }

    /// Cancel the loop and wait for the in-flight tick to finish.
    ///
    /// No-op if the monitor is not running.
    pub async fn stop(&self) {
        let mut slot = self.task.lock().await;
        let Some(task) = slot.take() else {
            return;
        };

        task.cancel.cancel();
        match task.handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::error!(error = %e, "Monitoring task ended abnormally"),
        }
        tracing::info!("Performance monitoring stopped");
    }

    /// Assemble the dashboard view. Never fails.
    pub async fn dashboard_snapshot(&self) -> DashboardView {
        DashboardView {
            system_resources: self.collector.system_snapshot().await,
            trending_metrics: self.collector.trending().await,
            recent_alerts: self.alerts.recent(DASHBOARD_ALERT_WINDOW).await,
            store_performance: self.collector.store_stats().await,
            monitoring_status: MonitoringStatus {
                active: self.is_running().await,
                last_check: self.collector.last_system_check().await,
                rules_configured: self.alerts.rule_count().await,
            },
        }
    }
}

/// Tick until `cancel` fires. Cancellation is only observed between
/// ticks, so a tick always runs to completion.
async fn run_loop(
    collector: Arc<MetricsCollector>,
    alerts: Arc<AlertManager>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        let tick = AssertUnwindSafe(run_tick(&collector, &alerts, retention)).catch_unwind();
        if let Err(panic) = tick.await {
            tracing::error!(panic = %panic_message(panic.as_ref()), "Monitor tick panicked -- continuing");
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    tracing::debug!("Monitoring loop exited");
}

/// One pass: sample, evaluate, evict.
async fn run_tick(collector: &MetricsCollector, alerts: &AlertManager, retention: Duration) {
    let snapshot = collector.sample_system_resources().await;
    let fired = alerts.evaluate_all(collector).await;
    let evicted = collector.evict_expired(retention).await;

    tracing::debug!(
        system_sampled = !snapshot.is_empty(),
        alerts_fired = fired.len(),
        evicted,
        "Monitor tick complete",
    );
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
