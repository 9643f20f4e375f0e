//! Well-known metric names and snapshot-store keys.
//!
//! These are the canonical names used by the system sampler, the API
//! event helper, the default alert rules and the dashboard.

/// Store namespace holding every snapshot published by the engine.
pub const STORE_NAMESPACE: &str = "metrics";

/// Key of the composite system-resources snapshot.
pub const KEY_SYSTEM_CURRENT: &str = "system:current";

/// Host CPU utilisation, 0-100.
pub const METRIC_CPU_PERCENT: &str = "system.cpu_percent";
/// Host memory utilisation, 0-100.
pub const METRIC_MEMORY_PERCENT: &str = "system.memory_percent";
pub const METRIC_MEMORY_USED: &str = "system.memory_used";
pub const METRIC_MEMORY_AVAILABLE: &str = "system.memory_available";
/// Utilisation of the monitored mount, 0-100.
pub const METRIC_DISK_PERCENT: &str = "system.disk_percent";
pub const METRIC_DISK_USED: &str = "system.disk_used";
pub const METRIC_DISK_FREE: &str = "system.disk_free";
/// Cumulative bytes sent across all interfaces.
pub const METRIC_NETWORK_SENT: &str = "system.network_sent";
/// Cumulative bytes received across all interfaces.
pub const METRIC_NETWORK_RECV: &str = "system.network_recv";

/// Per-request latency in milliseconds.
pub const METRIC_API_RESPONSE_TIME: &str = "api.response_time";
pub const METRIC_API_REQUESTS: &str = "api.requests";
pub const METRIC_API_REQUEST_SIZE: &str = "api.request_size";
pub const METRIC_API_RESPONSE_SIZE: &str = "api.response_size";

pub const UNIT_PERCENT: &str = "%";
pub const UNIT_BYTES: &str = "bytes";
pub const UNIT_MILLIS: &str = "ms";

/// Store key of the latest sample for `metric_name`.
pub fn current_key(metric_name: &str) -> String {
    format!("current:{metric_name}")
}

/// Store key of a fired alert, unique per rule and second.
pub fn alert_key(rule_name: &str, epoch_seconds: i64) -> String {
    format!("alert:{rule_name}:{epoch_seconds}")
}

/// Name of the timer metric recorded for an instrumented operation.
pub fn execution_time_metric(operation: &str) -> String {
    format!("function.{operation}.execution_time")
}

/// Name of the error counter recorded for an instrumented operation.
pub fn error_metric(operation: &str) -> String {
    format!("function.{operation}.errors")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_keys() {
        assert_eq!(current_key("api.requests"), "current:api.requests");
        assert_eq!(alert_key("high_cpu_usage", 1700000000), "alert:high_cpu_usage:1700000000");
    }

    #[test]
    fn instrumentation_names() {
        assert_eq!(execution_time_metric("load"), "function.load.execution_time");
        assert_eq!(error_metric("load"), "function.load.errors");
    }
}
