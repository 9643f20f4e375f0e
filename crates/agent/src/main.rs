//! `perfwatch-agent` -- host performance monitoring daemon.
//!
//! Samples CPU, memory, disk and network usage on a fixed interval,
//! evaluates the default alert rules against the latest readings, and
//! logs the final dashboard on shutdown.
//!
//! Configuration is read from the environment (and `.env`); see
//! [`MonitorConfig::from_env`] for the variables.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use perfwatch_agent::config::MonitorConfig;
use perfwatch_agent::monitor::PerformanceMonitor;
use perfwatch_agent::probe::SystemProbe;
use perfwatch_cache::MemoryStore;

/// How often expired store entries are swept.
const STORE_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "perfwatch_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MonitorConfig::from_env();
    let interval = config.interval;

    tracing::info!(
        interval_secs = interval.as_secs(),
        retention_secs = config.retention.as_secs(),
        disk_path = %config.disk_path.display(),
        "Starting perfwatch-agent",
    );

    let store = Arc::new(MemoryStore::new());
    let probe = Arc::new(SystemProbe::new(config.disk_path.clone()));

    let monitor = match PerformanceMonitor::new(config, store.clone(), probe) {
        Ok(monitor) => monitor,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build performance monitor");
            std::process::exit(1);
        }
    };

    if let Err(e) = monitor.start(interval).await {
        tracing::error!(error = %e, "Failed to start performance monitoring");
        std::process::exit(1);
    }

    // --- Store sweeper ---
    let sweep_cancel = CancellationToken::new();
    let sweep_handle = tokio::spawn(run_store_sweeper(Arc::clone(&store), sweep_cancel.clone()));

    shutdown_signal().await;

    monitor.stop().await;
    sweep_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweep_handle).await;

    let dashboard = monitor.dashboard_snapshot().await;
    match serde_json::to_string_pretty(&dashboard) {
        Ok(json) => tracing::info!("Final dashboard:\n{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialise final dashboard"),
    }

    tracing::info!("Shutdown complete");
}

/// Periodically drop expired entries that were never read again.
async fn run_store_sweeper(store: Arc<MemoryStore>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(STORE_SWEEP_INTERVAL);
    // First tick completes immediately; nothing to sweep yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let purged = store.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "Swept expired store entries");
                }
            }
        }
    }
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
