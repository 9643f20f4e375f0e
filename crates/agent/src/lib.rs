//! `perfwatch-agent` library crate.
//!
//! Runtime half of the monitoring engine: the metrics collector, the alert
//! manager, the periodic monitor loop and scoped-timer instrumentation.
//! The daemon entrypoint lives in `main.rs`.

pub mod alerts;
pub mod collector;
pub mod config;
pub mod monitor;
pub mod probe;
pub mod timer;
