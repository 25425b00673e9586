//! Per-identity attempt state.

use super::clock::duration_millis;
use super::policy::RateLimitPolicy;

/// Attempts recorded for one client identity.
///
/// All timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Attempts observed in the current window
    count: u32,
    /// When the current counting window ends
    reset_time: u64,
    /// When the hard block lifts; `None` while not blocked
    block_until: Option<u64>,
}

impl RateLimitEntry {
    /// A fresh window starting at `now`.
    pub fn new(now: u64, policy: &RateLimitPolicy) -> Self {
        Self {
            count: 0,
            reset_time: now.saturating_add(duration_millis(policy.window)),
            block_until: None,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset_time(&self) -> u64 {
        self.reset_time
    }

    pub fn block_until(&self) -> Option<u64> {
        self.block_until
    }

    pub fn is_blocked(&self) -> bool {
        self.block_until.is_some()
    }

    /// The block end if a block is still in force at `now`.
    pub fn active_block(&self, now: u64) -> Option<u64> {
        self.block_until.filter(|&until| now < until)
    }

    /// Whether the counting window has ended.
    pub fn window_expired(&self, now: u64) -> bool {
        now > self.reset_time
    }

    /// Whether the entry no longer influences any decision and can be dropped.
    pub fn is_stale(&self, now: u64) -> bool {
        self.window_expired(now) && self.block_until.map_or(true, |until| now > until)
    }

    /// Count one attempt.
    ///
    /// Returns `true` while the count stays within `max_attempts`. Crossing
    /// the quota starts a hard block from `now`.
    pub fn record_attempt(&mut self, now: u64, policy: &RateLimitPolicy) -> bool {
        self.count = self.count.saturating_add(1);
        if self.count > policy.max_attempts {
            let block = duration_millis(policy.effective_block_duration());
            self.block_until = Some(now.saturating_add(block));
            false
        } else {
            true
        }
    }

    /// Attempts left in the current window.
    pub fn remaining(&self, policy: &RateLimitPolicy) -> u32 {
        policy.max_attempts.saturating_sub(self.count)
    }
}
