//! Alert rule registry, cooldown gating and alert history.
//!
//! Rules are evaluated against the *published* current value of each
//! metric (read through the collector's snapshot store), not against the
//! buffered history, so alert cadence is independent of retention.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use perfwatch_core::alert::{AlertEvent, AlertRule};
use perfwatch_core::cooldown::{CooldownKey, CooldownTracker};
use perfwatch_core::error::CoreError;
use perfwatch_core::metric_names::alert_key;
use perfwatch_core::types::{cutoff, Timestamp};

use crate::collector::MetricsCollector;
use crate::config::MonitorConfig;

/// Holds the rule set and fires [`AlertEvent`]s at most once per rule per
/// cooldown window.
pub struct AlertManager {
    rules: RwLock<Vec<AlertRule>>,
    cooldowns: Mutex<CooldownTracker>,
    history: Mutex<VecDeque<AlertEvent>>,
    history_capacity: usize,
    alert_ttl: Duration,
}

impl AlertManager {
    /// Create a manager with no rules.
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            cooldowns: Mutex::new(CooldownTracker::new()),
            history: Mutex::new(VecDeque::new()),
            history_capacity: config.history_capacity.max(1),
            alert_ttl: config.alert_ttl,
        }
    }

    /// Create a manager pre-loaded with `rules`, validating each one.
    pub fn with_rules(config: &MonitorConfig, rules: Vec<AlertRule>) -> Result<Self, CoreError> {
        for rule in &rules {
            rule.validate()?;
        }
        Ok(Self {
            rules: RwLock::new(rules),
            ..Self::new(config)
        })
    }

    /// Add a rule. Duplicate names are allowed and evaluated independently.
    pub async fn register(&self, rule: AlertRule) -> Result<(), CoreError> {
        rule.validate()?;
        if !rule.comparator.is_supported() {
            tracing::warn!(
                rule = %rule.name,
                comparator = %rule.comparator,
                "Alert rule uses an unsupported comparator and will never fire",
            );
        }
        tracing::info!(rule = %rule.name, metric = %rule.metric_name, "Registered alert rule");
        self.rules.write().await.push(rule);
        Ok(())
    }

    pub async fn rules(&self) -> Vec<AlertRule> {
        self.rules.read().await.clone()
    }

    pub async fn rule_count(&self) -> usize {
        self.rules.read().await.len()
    }

    /// Evaluate every rule against the collector's current values.
    ///
    /// Returns the events fired during this pass.
    pub async fn evaluate_all(&self, collector: &MetricsCollector) -> Vec<AlertEvent> {
        self.evaluate_all_at(collector, Utc::now()).await
    }

    /// [`evaluate_all`](Self::evaluate_all) against an explicit clock.
    pub async fn evaluate_all_at(
        &self,
        collector: &MetricsCollector,
        now: Timestamp,
    ) -> Vec<AlertEvent> {
        let rules = self.rules().await;
        let mut fired = Vec::new();

        for rule in &rules {
            let key: CooldownKey = (rule.name.clone(), rule.metric_name.clone());
            if self.cooldowns.lock().await.is_cooling(&key, now) {
                continue;
            }

            let Some(value) = collector.current_value(&rule.metric_name).await else {
                continue;
            };
            if !rule.evaluate(value) {
                continue;
            }

            // The store read above is a suspension point; re-check and set
            // the cooldown under one lock so only one pass fires.
            let cooldown = Duration::from_secs(rule.cooldown_seconds);
            if !self.cooldowns.lock().await.try_claim(&key, now, cooldown) {
                continue;
            }

            let event = AlertEvent::fired(rule, value, now);
            self.trigger(collector, &event).await;
            fired.push(event);
        }

        self.cooldowns.lock().await.prune(now);
        fired
    }

    /// Append to history, mirror to the store and log.
    async fn trigger(&self, collector: &MetricsCollector, event: &AlertEvent) {
        {
            let mut history = self.history.lock().await;
            if history.len() >= self.history_capacity {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        match serde_json::to_value(event) {
            Ok(json) => {
                collector
                    .publish(
                        &alert_key(&event.rule_name, event.timestamp.timestamp()),
                        json,
                        self.alert_ttl,
                        &["alerts", event.severity.as_str()],
                    )
                    .await;
            }
            Err(e) => {
                tracing::warn!(rule = %event.rule_name, error = %e, "Failed to serialise alert event");
            }
        }

        tracing::warn!(
            rule = %event.rule_name,
            metric = %event.metric_name,
            value = event.value,
            threshold = event.threshold,
            severity = event.severity.as_str(),
            "Performance alert triggered: {}",
            event.message,
        );
    }

    /// Alerts fired within the last `window`, oldest first.
    pub async fn recent(&self, window: Duration) -> Vec<AlertEvent> {
        self.recent_at(window, Utc::now()).await
    }

    /// [`recent`](Self::recent) against an explicit clock.
    pub async fn recent_at(&self, window: Duration, now: Timestamp) -> Vec<AlertEvent> {
        let since = cutoff(now, window);
        self.history
            .lock()
            .await
            .iter()
            .filter(|e| e.timestamp >= since)
            .cloned()
            .collect()
    }
}
