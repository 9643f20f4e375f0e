//! Threshold alert rules and the events they produce.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::metric_names::{
    METRIC_API_RESPONSE_TIME, METRIC_CPU_PERCENT, METRIC_DISK_PERCENT, METRIC_MEMORY_PERCENT,
};
use crate::types::Timestamp;

/// Minimum interval between repeated firings of the same rule, unless the
/// rule overrides it.
pub const DEFAULT_COOLDOWN_SECS: u64 = 300;

const DEFAULT_MESSAGE_TEMPLATE: &str = "{metric_name} = {value} (threshold: {threshold})";

/// Comparison applied as `value <op> threshold`.
///
/// Serialized as the operator symbol. Any symbol outside the supported set
/// deserializes to [`Comparator::Unsupported`], which never fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Comparator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    Unsupported(String),
}

impl Comparator {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Unsupported(raw) => raw,
        }
    }

    /// Apply the comparison. `Unsupported` fails closed.
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Lt => value < threshold,
            Self::Ge => value >= threshold,
            Self::Le => value <= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
            Self::Unsupported(_) => false,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

impl From<&str> for Comparator {
    fn from(symbol: &str) -> Self {
        match symbol.trim() {
            ">" => Self::Gt,
            "<" => Self::Lt,
            ">=" => Self::Ge,
            "<=" => Self::Le,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            other => Self::Unsupported(other.to_string()),
        }
    }
}

impl From<String> for Comparator {
    fn from(symbol: String) -> Self {
        Self::from(symbol.as_str())
    }
}

impl From<Comparator> for String {
    fn from(comparator: Comparator) -> Self {
        comparator.symbol().to_string()
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Severity attached to a rule and copied onto every event it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_message_template() -> String {
    DEFAULT_MESSAGE_TEMPLATE.to_string()
}

/// A named threshold condition on one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub name: String,
    pub metric_name: String,
    pub threshold: f64,
    pub comparator: Comparator,
    pub severity: AlertSeverity,
    /// Supports `{metric_name}`, `{value}` and `{threshold}`, optionally with
    /// a fixed precision such as `{value:.1f}`.
    #[serde(default = "default_message_template")]
    pub message_template: String,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_seconds: u64,
}

impl AlertRule {
    pub fn new(
        name: impl Into<String>,
        metric_name: impl Into<String>,
        comparator: Comparator,
        threshold: f64,
        severity: AlertSeverity,
    ) -> Self {
        Self {
            name: name.into(),
            metric_name: metric_name.into(),
            threshold,
            comparator,
            severity,
            message_template: default_message_template(),
            cooldown_seconds: DEFAULT_COOLDOWN_SECS,
        }
    }

    pub fn with_message(mut self, template: impl Into<String>) -> Self {
        self.message_template = template.into();
        self
    }

    pub fn with_cooldown_secs(mut self, seconds: u64) -> Self {
        self.cooldown_seconds = seconds;
        self
    }

    /// Does `value` satisfy this rule's condition?
    pub fn evaluate(&self, value: f64) -> bool {
        self.comparator.compare(value, self.threshold)
    }

    /// Check the rule is usable before it is registered.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("alert rule name must not be empty".into()));
        }
        if self.metric_name.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "alert rule '{}' has an empty metric name",
                self.name
            )));
        }
        if !self.threshold.is_finite() {
            return Err(CoreError::Validation(format!(
                "alert rule '{}' threshold must be finite",
                self.name
            )));
        }
        Ok(())
    }

    /// Fill the message template for an observed `value`.
    pub fn render_message(&self, value: f64) -> String {
        let mut out = String::with_capacity(self.message_template.len() + 16);
        let mut rest = self.message_template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                return out;
            };

            let placeholder = &after[..close];
            match self.substitute(placeholder, value) {
                Some(text) => out.push_str(&text),
                None => {
                    out.push('{');
                    out.push_str(placeholder);
                    out.push('}');
                }
            }
            rest = &after[close + 1..];
        }

        out.push_str(rest);
        out
    }

    fn substitute(&self, placeholder: &str, value: f64) -> Option<String> {
        let (field, spec) = match placeholder.split_once(':') {
            Some((field, spec)) => (field, Some(spec)),
            None => (placeholder, None),
        };

        let number = match field {
            "metric_name" => return Some(self.metric_name.clone()),
            "value" => value,
            "threshold" => self.threshold,
            _ => return None,
        };

        Some(match spec.and_then(parse_precision) {
            Some(precision) => format!("{number:.precision$}"),
            None => number.to_string(),
        })
    }
}

/// Parse a `.Nf` / `.N` precision spec.
fn parse_precision(spec: &str) -> Option<usize> {
    spec.strip_prefix('.')?.trim_end_matches('f').parse().ok()
}

/// A single firing of an alert rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub rule_name: String,
    pub metric_name: String,
    /// The observed value that satisfied the rule.
    pub value: f64,
    pub threshold: f64,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: Timestamp,
}

impl AlertEvent {
    /// Build the event for `rule` firing on `value` at `timestamp`.
    pub fn fired(rule: &AlertRule, value: f64, timestamp: Timestamp) -> Self {
        Self {
            rule_name: rule.name.clone(),
            metric_name: rule.metric_name.clone(),
            value,
            threshold: rule.threshold,
            severity: rule.severity,
            message: rule.render_message(value),
            timestamp,
        }
    }
}

/// Rules every monitor starts with.
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            "high_cpu_usage",
            METRIC_CPU_PERCENT,
            Comparator::Gt,
            85.0,
            AlertSeverity::High,
        )
        .with_message("High CPU usage detected: {value:.1f}% (threshold: {threshold}%)"),
        AlertRule::new(
            "high_memory_usage",
            METRIC_MEMORY_PERCENT,
            Comparator::Gt,
            90.0,
            AlertSeverity::High,
        )
        .with_message("High memory usage detected: {value:.1f}% (threshold: {threshold}%)"),
        AlertRule::new(
            "slow_api_response",
            METRIC_API_RESPONSE_TIME,
            Comparator::Gt,
            5000.0,
            AlertSeverity::Medium,
        )
        .with_message("Slow API response detected: {value:.0f}ms (threshold: {threshold}ms)"),
        AlertRule::new(
            "high_disk_usage",
            METRIC_DISK_PERCENT,
            Comparator::Gt,
            85.0,
            AlertSeverity::Medium,
        )
        .with_message("High disk usage detected: {value:.1f}% (threshold: {threshold}%)"),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
