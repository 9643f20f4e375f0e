//! `perfwatch-core` -- pure domain types and logic for the monitoring engine.
//!
//! Nothing in this crate performs I/O. Buffers, statistics, alert rules and
//! cooldown tracking live here so they can be tested in isolation; the
//! runtime pieces (collector, alert manager, monitor loop) are in
//! `perfwatch-agent`.

pub mod alert;
pub mod buffer;
pub mod cooldown;
pub mod error;
pub mod metric_names;
pub mod sample;
pub mod stats;
pub mod types;
