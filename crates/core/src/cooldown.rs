//! Per-rule cooldown bookkeeping.
//!
//! Pure logic -- the caller owns the tracker (typically behind a
//! `tokio::sync::Mutex`) and supplies the clock.

use std::collections::HashMap;
use std::time::Duration;

use crate::types::Timestamp;

/// Composite key for cooldown tracking: (rule_name, metric_name).
pub type CooldownKey = (String, String);

/// Tracks the earliest instant at which each rule may fire again.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    next_eligible: HashMap<CooldownKey, Timestamp>,
}

impl CooldownTracker {
    /// Create a new, empty cooldown tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `key` fired recently and `now` is still inside its window.
    pub fn is_cooling(&self, key: &CooldownKey, now: Timestamp) -> bool {
        self.next_eligible
            .get(key)
            .is_some_and(|next| now < *next)
    }

    /// Claim the right to fire for `key`.
    ///
    /// Checks and updates in one step: if the key is not cooling down, the
    /// next eligible instant becomes `now + cooldown` and `true` is returned.
    /// Returns `false` while the key is inside its window.
    pub fn try_claim(&mut self, key: &CooldownKey, now: Timestamp, cooldown: Duration) -> bool {
        if self.is_cooling(key, now) {
            return false;
        }
        let window = chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX);
        let next = now.checked_add_signed(window).unwrap_or(Timestamp::MAX_UTC);
        self.next_eligible.insert(key.clone(), next);
        true
    }

    pub fn next_eligible(&self, key: &CooldownKey) -> Option<Timestamp> {
        self.next_eligible.get(key).copied()
    }

    /// Forget entries whose window has already elapsed.
    pub fn prune(&mut self, now: Timestamp) {
        self.next_eligible.retain(|_, next| now < *next);
    }

    pub fn len(&self) -> usize {
        self.next_eligible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next_eligible.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
