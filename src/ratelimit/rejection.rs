//! The response body handed back to clients that were refused.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use super::limiter::RateLimitDecision;

/// HTTP status for a refused attempt.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

const BLOCKED_MESSAGE: &str = "Too many attempts. You have been temporarily blocked.";
const LIMITED_MESSAGE: &str = "Too many attempts. Please try again later.";

/// JSON body of a 429 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRejection {
    pub error: String,
    pub remaining_attempts: u32,
    /// ISO-8601 UTC timestamp after which a retry can succeed
    pub reset_time: String,
}

impl RateLimitRejection {
    /// Build the body for a refused decision.
    pub fn from_decision(decision: &RateLimitDecision) -> Self {
        Self {
            error: rejection_message(decision).to_string(),
            remaining_attempts: decision.remaining_attempts,
            reset_time: decision
                .reset_at()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// User-facing message for a refused decision.
pub fn rejection_message(decision: &RateLimitDecision) -> &'static str {
    if decision.blocked {
        BLOCKED_MESSAGE
    } else {
        LIMITED_MESSAGE
    }
}

/// Value for the `Retry-After` header, in whole seconds rounded up.
pub fn retry_after_secs(decision: &RateLimitDecision, now: u64) -> u64 {
    decision.retry_after(now).as_millis().div_ceil(1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::identity::RequestContext;
    use crate::ratelimit::limiter::RateLimiter;
    use crate::ratelimit::policy::RateLimitPolicy;
    use std::sync::Arc;
    use std::time::Duration;

    // 2024-01-01T00:00:00Z
    const START: u64 = 1_704_067_200_000;

    fn blocked_decision() -> RateLimitDecision {
        let limiter = RateLimiter::with_clock(Arc::new(ManualClock::new(START)));
        let policy = RateLimitPolicy::new(Duration::from_secs(60), 1)
            .with_block_duration(Duration::from_millis(90_500));
        let ctx = RequestContext::new().with_real_ip("192.0.2.10");
        limiter.check(&ctx, &policy);
        limiter.check(&ctx, &policy)
    }

    #[test]
    fn test_blocked_body() {
        let body = RateLimitRejection::from_decision(&blocked_decision());
        assert_eq!(body.error, BLOCKED_MESSAGE);
        assert_eq!(body.remaining_attempts, 0);
        assert_eq!(body.reset_time, "2024-01-01T00:01:30.500Z");
    }

    #[test]
    fn test_json_field_names() {
        let json = RateLimitRejection::from_decision(&blocked_decision())
            .to_json()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["remainingAttempts"], 0);
        assert_eq!(value["resetTime"], "2024-01-01T00:01:30.500Z");
        assert!(value["error"].as_str().unwrap().contains("temporarily blocked"));
    }

    #[test]
    fn test_limited_message() {
        let decision = RateLimitDecision {
            allowed: false,
            remaining_attempts: 0,
            reset_time: START,
            blocked: false,
        };
        assert_eq!(rejection_message(&decision), LIMITED_MESSAGE);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let decision = blocked_decision();
        assert_eq!(retry_after_secs(&decision, START), 91);
        assert_eq!(retry_after_secs(&decision, START + 90_000), 1);
        assert_eq!(retry_after_secs(&decision, START + 100_000), 0);
    }
}
