use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use perfwatch_core::buffer::DEFAULT_BUFFER_CAPACITY;

/// Monitor configuration.
///
/// [`Default`] gives values suitable for a single host; [`from_env`]
/// overrides them from environment variables.
///
/// [`from_env`]: MonitorConfig::from_env
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between monitor ticks (default: 30s).
    pub interval: Duration,
    /// Samples older than this are trimmed each tick (default: 24h).
    pub retention: Duration,
    /// Samples kept per metric name (default: 1000).
    pub buffer_capacity: usize,
    /// Alert events kept in memory (default: 1000).
    pub history_capacity: usize,
    /// Window used for the dashboard's trending statistics (default: 60 min).
    pub trending_window: Duration,
    /// Upper bound on distinct metric names (default: 10 000).
    pub max_metrics: usize,
    /// Bound on a single OS probe call (default: 5s).
    pub probe_timeout: Duration,
    /// Bound on a single snapshot-store call (default: 2s).
    pub store_timeout: Duration,
    /// Mount whose usage is reported as disk metrics (default: `/`).
    pub disk_path: PathBuf,
    /// TTL of `current:<metric>` snapshots.
    pub current_ttl: Duration,
    /// TTL of the composite system snapshot.
    pub system_ttl: Duration,
    /// TTL of mirrored alert events.
    pub alert_ttl: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            retention: Duration::from_secs(24 * 3600),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            history_capacity: 1000,
            trending_window: Duration::from_secs(60 * 60),
            max_metrics: 10_000,
            probe_timeout: Duration::from_secs(5),
            store_timeout: Duration::from_secs(2),
            disk_path: PathBuf::from("/"),
            current_ttl: Duration::from_secs(3600),
            system_ttl: Duration::from_secs(60),
            alert_ttl: Duration::from_secs(86_400),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// Unparseable values are logged and replaced by the default.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `MONITOR_INTERVAL_SECS`   | `30`    |
    /// | `METRICS_RETENTION_HOURS` | `24`    |
    /// | `METRICS_BUFFER_CAPACITY` | `1000`  |
    /// | `ALERT_HISTORY_CAPACITY`  | `1000`  |
    /// | `TRENDING_WINDOW_MINUTES` | `60`    |
    /// | `METRICS_MAX_NAMES`       | `10000` |
    /// | `PROBE_TIMEOUT_SECS`      | `5`     |
    /// | `STORE_TIMEOUT_SECS`      | `2`     |
    /// | `DISK_MOUNT_PATH`         | `/`     |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            interval: env_parse("MONITOR_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            retention: env_parse::<u64>("METRICS_RETENTION_HOURS")
                .map(|h| Duration::from_secs(h.saturating_mul(3600)))
                .unwrap_or(defaults.retention),
            buffer_capacity: env_parse("METRICS_BUFFER_CAPACITY")
                .unwrap_or(defaults.buffer_capacity),
            history_capacity: env_parse("ALERT_HISTORY_CAPACITY")
                .unwrap_or(defaults.history_capacity),
            trending_window: env_parse::<u64>("TRENDING_WINDOW_MINUTES")
                .map(|m| Duration::from_secs(m.saturating_mul(60)))
                .unwrap_or(defaults.trending_window),
            max_metrics: env_parse("METRICS_MAX_NAMES").unwrap_or(defaults.max_metrics),
            probe_timeout: env_parse("PROBE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.probe_timeout),
            store_timeout: env_parse("STORE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.store_timeout),
            disk_path: std::env::var("DISK_MOUNT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.disk_path),
            ..defaults
        }
    }
}

/// Read and parse `key`, logging (and ignoring) malformed values.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring malformed environment variable");
            None
        }
    }
}
