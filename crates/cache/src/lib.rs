//! Snapshot store used to publish "current value" views.
//!
//! [`SnapshotStore`] is the seam between the monitoring engine and whatever
//! TTL cache backs it. [`MemoryStore`] is the in-process implementation.

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{SnapshotStore, StoreError, StoreStats};
