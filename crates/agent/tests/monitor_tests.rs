//! Integration tests for [`PerformanceMonitor`]: lifecycle, loop
//! resilience and dashboard assembly.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;

use common::{eventually, test_config, FakeProbe, PanickingStore, UnreachableStore};
use perfwatch_agent::monitor::{MonitorError, MonitorState, PerformanceMonitor};
use perfwatch_cache::MemoryStore;
use perfwatch_core::alert::{AlertRule, AlertSeverity, Comparator};
use perfwatch_core::metric_names::METRIC_CPU_PERCENT;
use perfwatch_core::sample::MetricKind;

const TICK: Duration = Duration::from_millis(20);
const WAIT: Duration = Duration::from_secs(2);

fn monitor_with_probe(probe: Arc<FakeProbe>) -> PerformanceMonitor {
    PerformanceMonitor::new(test_config(), Arc::new(MemoryStore::new()), probe).unwrap()
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_monitor_is_stopped_with_default_rules() {
    let monitor = monitor_with_probe(Arc::new(FakeProbe::healthy()));

    assert_eq!(monitor.state().await, MonitorState::Stopped);
    assert_eq!(monitor.alerts().rule_count().await, 4);
}

#[tokio::test]
async fn zero_interval_is_rejected() {
    let monitor = monitor_with_probe(Arc::new(FakeProbe::healthy()));

    assert_matches!(monitor.start(Duration::ZERO).await, Err(MonitorError::InvalidInterval));
    assert!(!monitor.is_running().await);
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let probe = Arc::new(FakeProbe::healthy());
    let monitor = monitor_with_probe(probe.clone());

    monitor.start(TICK).await.unwrap();
    monitor.start(TICK).await.unwrap();
    assert!(monitor.is_running().await);

    monitor.stop().await;
    assert_eq!(monitor.state().await, MonitorState::Stopped);
    monitor.stop().await;
    assert_eq!(monitor.state().await, MonitorState::Stopped);

    // No ticks after stop returns.
    let calls = probe.cpu_calls();
    tokio::time::sleep(TICK * 5).await;
    assert_eq!(probe.cpu_calls(), calls);
}

#[tokio::test]
async fn stop_without_start_is_a_no_op() {
    let monitor = monitor_with_probe(Arc::new(FakeProbe::healthy()));
    monitor.stop().await;
    assert_eq!(monitor.state().await, MonitorState::Stopped);
}

#[tokio::test]
async fn monitor_can_restart_after_stop() {
    let probe = Arc::new(FakeProbe::healthy());
    let monitor = monitor_with_probe(probe.clone());

    monitor.start(TICK).await.unwrap();
    monitor.stop().await;
    let calls = probe.cpu_calls();

    monitor.start(TICK).await.unwrap();
    assert!(eventually(WAIT, || async { probe.cpu_calls() > calls }).await);
    monitor.stop().await;
}

// ---------------------------------------------------------------------------
// Loop behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn loop_samples_system_resources() {
    let probe = Arc::new(FakeProbe::healthy());
    let monitor = monitor_with_probe(probe.clone());

    monitor.start(TICK).await.unwrap();
    assert!(eventually(WAIT, || async { probe.cpu_calls() >= 3 }).await);
    monitor.stop().await;

    let collector = monitor.collector();
    assert!(collector.last_system_check().await.is_some());
    assert!(collector.samples(METRIC_CPU_PERCENT).await.len() >= 3);
}

#[tokio::test]
async fn loop_fires_default_alert_once_per_cooldown() {
    let probe = Arc::new(FakeProbe::with_cpu(97.0));
    let monitor = monitor_with_probe(probe.clone());

    monitor.start(TICK).await.unwrap();
    assert!(eventually(WAIT, || async { probe.cpu_calls() >= 4 }).await);
    monitor.stop().await;

    let recent = monitor.alerts().recent(Duration::from_secs(3600)).await;
    let cpu_alerts: Vec<_> = recent.iter().filter(|e| e.rule_name == "high_cpu_usage").collect();
    assert_eq!(cpu_alerts.len(), 1);
}

#[tokio::test]
async fn panicking_tick_does_not_kill_the_loop() {
    let probe = Arc::new(FakeProbe::healthy());
    let monitor =
        PerformanceMonitor::new(test_config(), Arc::new(PanickingStore), probe.clone()).unwrap();

    monitor.start(TICK).await.unwrap();
    assert!(eventually(WAIT, || async { probe.cpu_calls() >= 3 }).await);
    assert!(monitor.is_running().await);
    monitor.stop().await;
}

#[tokio::test]
async fn rules_registered_while_running_are_evaluated() {
    let monitor = monitor_with_probe(Arc::new(FakeProbe::healthy()));
    monitor.start(TICK).await.unwrap();

    let rule = AlertRule::new("deep_queue", "queue.depth", Comparator::Ge, 100.0, AlertSeverity::Critical);
    monitor.register_rule(rule).await.unwrap();
    monitor
        .collector()
        .record("queue.depth", 150.0, MetricKind::Gauge, None, None)
        .await;

    let fired = eventually(WAIT, || async {
        monitor
            .alerts()
            .recent(Duration::from_secs(60))
            .await
            .iter()
            .any(|e| e.rule_name == "deep_queue")
    })
    .await;
    monitor.stop().await;

    assert!(fired);
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dashboard_before_first_tick() {
    let monitor = monitor_with_probe(Arc::new(FakeProbe::healthy()));

    let view = monitor.dashboard_snapshot().await;

    assert!(view.system_resources.is_none());
    assert!(view.trending_metrics.is_empty());
    assert!(view.recent_alerts.is_empty());
    assert!(view.store_performance.is_some());
    assert!(!view.monitoring_status.active);
    assert_eq!(view.monitoring_status.last_check, None);
    assert_eq!(view.monitoring_status.rules_configured, 4);
}

#[tokio::test]
async fn dashboard_reflects_running_monitor() {
    let probe = Arc::new(FakeProbe::healthy());
    let monitor = monitor_with_probe(probe.clone());

    monitor.start(TICK).await.unwrap();
    assert!(eventually(WAIT, || async { probe.cpu_calls() >= 2 }).await);
    let view = monitor.dashboard_snapshot().await;
    monitor.stop().await;

    assert!(view.monitoring_status.active);
    assert!(view.monitoring_status.last_check.is_some());
    assert_eq!(view.system_resources.and_then(|s| s.cpu_percent), Some(42.5));
    assert!(view.trending_metrics.contains_key(METRIC_CPU_PERCENT));
    assert!(view.store_performance.unwrap().sets > 0);
}

#[tokio::test]
async fn dashboard_degrades_when_store_is_down() {
    let probe = Arc::new(FakeProbe::healthy());
    let monitor =
        PerformanceMonitor::new(test_config(), Arc::new(UnreachableStore), probe.clone()).unwrap();

    monitor.start(TICK).await.unwrap();
    assert!(eventually(WAIT, || async { probe.cpu_calls() >= 2 }).await);
    let view = monitor.dashboard_snapshot().await;
    monitor.stop().await;

    assert!(view.system_resources.is_none());
    assert!(view.store_performance.is_none());
    assert!(view.recent_alerts.is_empty());
    // Buffers are local, so trending still works.
    assert!(view.trending_metrics.contains_key(METRIC_CPU_PERCENT));
    assert!(view.monitoring_status.active);
}

#[tokio::test]
async fn dashboard_serialises_every_section() {
    let monitor = monitor_with_probe(Arc::new(FakeProbe::healthy()));
    monitor.collector().sample_system_resources().await;

    let json = serde_json::to_value(monitor.dashboard_snapshot().await).unwrap();

    for key in [
        "system_resources",
        "trending_metrics",
        "recent_alerts",
        "store_performance",
        "monitoring_status",
    ] {
        assert!(json.get(key).is_some(), "missing dashboard key {key}");
    }
    assert_eq!(json["monitoring_status"]["active"], false);
    assert_eq!(json["monitoring_status"]["rules_configured"], 4);
    assert_eq!(json["system_resources"]["cpu_percent"], 42.5);
}
