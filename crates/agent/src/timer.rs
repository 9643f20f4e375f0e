//! Scoped timing of instrumented operations.
//!
//! ```ignore
//! let timer = collector.start_timer("load_profile").with_tag("source", "db");
//! match load_profile().await {
//!     Ok(p) => { timer.finish().await; Ok(p) }
//!     Err(e) => { timer.fail("db_error").await; Err(e) }
//! }
//! ```
//!
//! A timer dropped without `finish` or `fail` counts as an error with
//! `error_type = "abandoned"`.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;

use perfwatch_core::metric_names::{error_metric, execution_time_metric, UNIT_MILLIS};
use perfwatch_core::sample::MetricKind;
use perfwatch_core::types::Tags;

use crate::collector::MetricsCollector;

const ABANDONED: &str = "abandoned";

/// Measures one operation from creation until `finish`, `fail` or drop.
#[must_use = "a dropped timer records an abandoned operation"]
pub struct ScopedTimer {
    collector: Arc<MetricsCollector>,
    operation: String,
    tags: Tags,
    started: Instant,
    done: bool,
}

impl ScopedTimer {
    fn new(collector: Arc<MetricsCollector>, operation: &str) -> Self {
        let tags = Tags::from([("function".to_string(), operation.to_string())]);
        Self {
            collector,
            operation: operation.to_string(),
            tags,
            started: Instant::now(),
            done: false,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// Record the elapsed time as `function.<operation>.execution_time`.
    pub async fn finish(mut self) {
        self.done = true;
        let elapsed = self.elapsed_ms();
        self.collector
            .record(
                &execution_time_metric(&self.operation),
                elapsed,
                MetricKind::Timer,
                Some(self.tags.clone()),
                Some(UNIT_MILLIS),
            )
            .await;
    }

    /// Record one `function.<operation>.errors` tagged with `error_type`.
    pub async fn fail(mut self, error_type: &str) {
        self.done = true;
        let tags = error_tags(self.tags.clone(), error_type);
        self.collector
            .record(&error_metric(&self.operation), 1.0, MetricKind::Counter, Some(tags), None)
            .await;
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        if self.done {
            return;
        }

        let operation = std::mem::take(&mut self.operation);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let collector = Arc::clone(&self.collector);
                let tags = error_tags(std::mem::take(&mut self.tags), ABANDONED);
                handle.spawn(async move {
                    collector
                        .record(&error_metric(&operation), 1.0, MetricKind::Counter, Some(tags), None)
                        .await;
                });
            }
            Err(_) => {
                tracing::warn!(operation = %operation, "Timer dropped outside a runtime -- error not recorded");
            }
        }
    }
}

fn error_tags(mut tags: Tags, error_type: &str) -> Tags {
    tags.insert("error_type".to_string(), error_type.to_string());
    tags
}

/// Last path segment of `E`'s type name, e.g. `ParseIntError`.
fn short_type_name<E>() -> &'static str {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

impl MetricsCollector {
    /// Start timing `operation`.
    pub fn start_timer(self: &Arc<Self>, operation: &str) -> ScopedTimer {
        ScopedTimer::new(Arc::clone(self), operation)
    }

    /// Await `fut`, recording its execution time on `Ok` or an error
    /// counter tagged with the error's type name on `Err`.
    ///
    /// If the returned future is dropped before completing, the operation
    /// is recorded as abandoned.
    pub async fn track<T, E, F>(self: &Arc<Self>, operation: &str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let timer = self.start_timer(operation);
        let result = fut.await;
        match &result {
            Ok(_) => timer.finish().await,
            Err(_) => timer.fail(short_type_name::<E>()).await,
        }
        result
    }
}
