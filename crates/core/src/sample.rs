//! The metric sample record pushed by producers.

use serde::{Deserialize, Serialize};

use crate::types::{Tags, Timestamp};

/// How a metric's values should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Monotonic count of occurrences.
    Counter,
    /// Point-in-time level (CPU %, bytes in use).
    Gauge,
    /// Distribution of observed sizes.
    Histogram,
    /// Elapsed durations, usually in milliseconds.
    Timer,
}

/// One timestamped numeric observation.
///
/// Immutable once created; the collector stores clones of it in the
/// per-name buffer and publishes it to the snapshot store as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub tags: Tags,
    pub unit: Option<String>,
}

impl MetricSample {
    /// Create a sample stamped with the current time, no tags and no unit.
    pub fn new(name: impl Into<String>, value: f64, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            value,
            kind,
            timestamp: chrono::Utc::now(),
            tags: Tags::new(),
            unit: None,
        }
    }

    /// Override the timestamp.
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Replace the tag map.
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Attach a unit label such as `"ms"` or `"bytes"`.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}
