//! Attempt limiting for sensitive operations.

mod clock;
mod entry;
mod identity;
mod limiter;
mod policy;
mod rejection;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::RateLimitEntry;
pub use identity::{ClientIdentity, RequestContext, FORWARDED_FOR_HEADER, REAL_IP_HEADER};
pub use limiter::{RateLimitDecision, RateLimiter};
pub use policy::{PolicyRule, PolicyTable, RateLimitPolicy, API, LOGIN, PASSWORD_CHANGE, REGISTRATION};
pub use rejection::{rejection_message, retry_after_secs, RateLimitRejection, STATUS_TOO_MANY_REQUESTS};
pub use sweeper::{Sweeper, DEFAULT_SWEEP_INTERVAL};
