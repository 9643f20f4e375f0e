//! Bounded, timestamp-ordered sample history for one metric name.

use std::collections::VecDeque;

use crate::sample::MetricSample;
use crate::types::Timestamp;

/// Default number of samples kept per metric name.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Ring of samples with a fixed maximum length, ordered by timestamp.
///
/// Appending beyond capacity evicts the oldest sample. A sample older than
/// the newest one is inserted at its place, so retention stays a prefix
/// trim even when samples arrive out of order.
#[derive(Debug, Clone)]
pub struct MetricBuffer {
    samples: VecDeque<MetricSample>,
    capacity: usize,
}

impl MetricBuffer {
    /// Create an empty buffer. A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(DEFAULT_BUFFER_CAPACITY)),
            capacity,
        }
    }

    /// Insert a sample, returning the evicted one if the buffer was full.
    ///
    /// Samples sharing a timestamp keep their arrival order. When full, the
    /// oldest sample goes, which may be the one just inserted.
    pub fn push(&mut self, sample: MetricSample) -> Option<MetricSample> {
        if self.is_newest(&sample) {
            self.samples.push_back(sample);
        } else {
            let at = self
                .samples
                .partition_point(|s| s.timestamp <= sample.timestamp);
            self.samples.insert(at, sample);
        }

        if self.samples.len() > self.capacity {
            self.samples.pop_front()
        } else {
            None
        }
    }

    /// Would `sample` become the latest entry if pushed now?
    pub fn is_newest(&self, sample: &MetricSample) -> bool {
        self.latest()
            .map_or(true, |latest| sample.timestamp >= latest.timestamp)
    }

    /// Drop samples from the front while they are older than `cutoff`.
    ///
    /// Returns the number of samples removed.
    pub fn evict_before(&mut self, cutoff: Timestamp) -> usize {
        let mut removed = 0;
        while self
            .samples
            .front()
            .is_some_and(|s| s.timestamp < cutoff)
        {
            self.samples.pop_front();
            removed += 1;
        }
        removed
    }

    /// Values of every sample with `timestamp >= cutoff`, oldest first.
    pub fn values_since(&self, cutoff: Timestamp) -> Vec<f64> {
        self.samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .map(|s| s.value)
            .collect()
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MetricBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::sample::MetricKind;

    fn gauge(value: f64) -> MetricSample {
        MetricSample::new("test.gauge", value, MetricKind::Gauge)
    }

    #[test]
    fn keeps_last_capacity_samples_in_order() {
        let mut buffer = MetricBuffer::new(3);
        for v in 1..=7 {
            buffer.push(gauge(f64::from(v)));
        }

        let values: Vec<f64> = buffer.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![5.0, 6.0, 7.0]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn push_reports_evicted_sample() {
        let mut buffer = MetricBuffer::new(1);
        assert!(buffer.push(gauge(1.0)).is_none());
        let evicted = buffer.push(gauge(2.0)).expect("first sample evicted");
        assert_eq!(evicted.value, 1.0);
        assert_eq!(buffer.latest().map(|s| s.value), Some(2.0));
    }

    #[test]
    fn zero_capacity_is_treated_as_one() {
        let buffer = MetricBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
    }

    #[test]
    fn evict_before_trims_only_the_old_prefix() {
        let now = Utc::now();
        let mut buffer = MetricBuffer::default();
        buffer.push(gauge(1.0).at(now - Duration::hours(30)));
        buffer.push(gauge(2.0).at(now - Duration::hours(25)));
        buffer.push(gauge(3.0).at(now - Duration::hours(1)));
        buffer.push(gauge(4.0).at(now));

        let removed = buffer.evict_before(now - Duration::hours(24));

        assert_eq!(removed, 2);
        assert!(buffer.iter().all(|s| s.timestamp >= now - Duration::hours(24)));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn late_sample_is_placed_by_timestamp() {
        let now = Utc::now();
        let mut buffer = MetricBuffer::default();
        buffer.push(gauge(1.0).at(now - Duration::hours(1)));
        buffer.push(gauge(2.0).at(now));

        let late = gauge(3.0).at(now - Duration::hours(48));
        assert!(!buffer.is_newest(&late));
        buffer.push(late);

        let values: Vec<f64> = buffer.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![3.0, 1.0, 2.0]);
        assert_eq!(buffer.latest().map(|s| s.value), Some(2.0));

        assert_eq!(buffer.evict_before(now - Duration::hours(24)), 1);
        assert!(buffer.iter().all(|s| s.timestamp >= now - Duration::hours(24)));
    }

    #[test]
    fn late_sample_into_full_buffer_is_dropped() {
        let now = Utc::now();
        let mut buffer = MetricBuffer::new(2);
        buffer.push(gauge(1.0).at(now - Duration::minutes(1)));
        buffer.push(gauge(2.0).at(now));

        let evicted = buffer.push(gauge(0.0).at(now - Duration::hours(1)));

        assert_eq!(evicted.map(|s| s.value), Some(0.0));
        let values: Vec<f64> = buffer.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn values_since_filters_by_window() {
        let now = Utc::now();
        let mut buffer = MetricBuffer::default();
        buffer.push(gauge(1.0).at(now - Duration::minutes(90)));
        buffer.push(gauge(2.0).at(now - Duration::minutes(30)));
        buffer.push(gauge(3.0).at(now));

        assert_eq!(buffer.values_since(now - Duration::minutes(60)), vec![2.0, 3.0]);
        assert!(buffer.values_since(now + Duration::minutes(1)).is_empty());
    }
}
