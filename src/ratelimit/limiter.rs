//! Core rate limiter implementation.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::entry::RateLimitEntry;
use super::identity::{ClientIdentity, RequestContext};
use super::policy::RateLimitPolicy;
use super::sweeper::Sweeper;

/// Outcome of a single `check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the guarded operation may proceed
    pub allowed: bool,
    /// Attempts left in the current window; zero when denied
    pub remaining_attempts: u32,
    /// When the caller may usefully retry, in ms since the epoch
    pub reset_time: u64,
    /// Whether the client is under a hard block
    pub blocked: bool,
}

impl RateLimitDecision {
    fn allowed(remaining_attempts: u32, reset_time: u64) -> Self {
        Self {
            allowed: true,
            remaining_attempts,
            reset_time,
            blocked: false,
        }
    }

    fn blocked(block_until: u64) -> Self {
        Self {
            allowed: false,
            remaining_attempts: 0,
            reset_time: block_until,
            blocked: true,
        }
    }

    /// `reset_time` as a UTC timestamp.
    pub fn reset_at(&self) -> DateTime<Utc> {
        i64::try_from(self.reset_time)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Time left until `reset_time`, measured from `now` (ms since the epoch).
    pub fn retry_after(&self, now: u64) -> Duration {
        Duration::from_millis(self.reset_time.saturating_sub(now))
    }
}

/// Tracks attempts per client identity and decides whether new ones pass.
///
/// The limiter is thread-safe and meant to be shared through an `Arc`. Each
/// `check` performs its read-modify-write under the store's per-key lock, so
/// concurrent checks, resets and sweeps never interleave on the same entry.
pub struct RateLimiter {
    /// Attempt state indexed by client identity
    entries: DashMap<ClientIdentity, RateLimitEntry>,
    /// Source of the current time
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a rate limiter on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Count one attempt from the client described by `context`.
    ///
    /// `policy.identifier`, when present, takes priority over the address
    /// headers in `context`.
    pub fn check(&self, context: &RequestContext, policy: &RateLimitPolicy) -> RateLimitDecision {
        let identity = ClientIdentity::resolve(context, policy.identifier.as_deref());
        self.check_identity(&identity, policy)
    }

    /// Count one attempt for an already resolved identity.
    pub fn check_identity(
        &self,
        identity: &ClientIdentity,
        policy: &RateLimitPolicy,
    ) -> RateLimitDecision {
        let now = self.clock.now_millis();

        trace!(
            identity = %identity,
            max_attempts = policy.max_attempts,
            "Checking rate limit"
        );

        let decision = match self.entries.entry(identity.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();

                // Probing while blocked neither extends nor resets the block
                if let Some(block_until) = entry.active_block(now) {
                    trace!(identity = %identity, block_until, "Client is blocked");
                    return RateLimitDecision::blocked(block_until);
                }

                if entry.window_expired(now) {
                    *entry = RateLimitEntry::new(now, policy);
                }
                Self::count_attempt(entry, now, policy)
            }
            Entry::Vacant(vacant) => {
                debug!(identity = %identity, "Tracking new client");
                let mut entry = RateLimitEntry::new(now, policy);
                let decision = Self::count_attempt(&mut entry, now, policy);
                vacant.insert(entry);
                decision
            }
        };

        if decision.blocked {
            debug!(
                identity = %identity,
                block_until = decision.reset_time,
                "Attempt quota exceeded, client blocked"
            );
        }

        decision
    }

    fn count_attempt(
        entry: &mut RateLimitEntry,
        now: u64,
        policy: &RateLimitPolicy,
    ) -> RateLimitDecision {
        if entry.record_attempt(now, policy) {
            RateLimitDecision::allowed(entry.remaining(policy), entry.reset_time())
        } else {
            // record_attempt always sets the block when it refuses
            RateLimitDecision::blocked(entry.block_until().unwrap_or(now))
        }
    }

    /// Forget every attempt of the client described by `context`.
    ///
    /// Identity resolves exactly as in [`RateLimiter::check`].
    pub fn reset(&self, context: &RequestContext, identifier: Option<&str>) {
        self.reset_identity(&ClientIdentity::resolve(context, identifier));
    }

    /// Forget every attempt of `identity`. No-op for unknown identities.
    pub fn reset_identity(&self, identity: &ClientIdentity) {
        if self.entries.remove(identity).is_some() {
            debug!(identity = %identity, "Rate limit state cleared");
        }
    }

    /// Drop entries whose window and block have both expired.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now_millis();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let stale = entry.is_stale(now);
            if stale {
                removed += 1;
            }
            !stale
        });

        debug!(
            removed,
            remaining = self.entries.len(),
            "Swept expired rate limit entries"
        );
        removed
    }

    /// Start periodic cleanup on the current tokio runtime.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> Sweeper {
        Sweeper::spawn(Arc::clone(self), interval)
    }

    /// Attempts recorded in the current window for `identity`.
    pub fn attempts(&self, identity: &ClientIdentity) -> Option<u32> {
        self.entries.get(identity).map(|entry| entry.count())
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.entries.len()
    }

    /// The limiter's current time in ms since the epoch.
    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
