use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// String-to-string dimensions attached to a sample.
///
/// Both keys and values are plain strings. Ordered so that serialized
/// snapshots are deterministic.
pub type Tags = BTreeMap<String, String>;

/// The instant `window` before `now`, saturating at the earliest
/// representable timestamp for absurdly large windows.
pub fn cutoff(now: Timestamp, window: Duration) -> Timestamp {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
