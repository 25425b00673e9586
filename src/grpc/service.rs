//! Guard service implementation.

use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument, warn};

use super::proto::marketguard::v1::{
    guard_service_server::GuardService, CheckRequest, CheckResponse, ClientContext, ResetRequest,
    ResetResponse,
};

use crate::ratelimit::{rejection_message, PolicyTable, RateLimitDecision, RateLimiter, RequestContext};

/// Implementation of the `GuardService` gRPC interface.
pub struct GuardServiceImpl {
    /// The rate limiter instance
    rate_limiter: Arc<RateLimiter>,
    /// Policies callers can name
    policies: Arc<PolicyTable>,
}

impl GuardServiceImpl {
    /// Create a new GuardServiceImpl over a limiter and its policies.
    pub fn new(rate_limiter: Arc<RateLimiter>, policies: Arc<PolicyTable>) -> Self {
        Self {
            rate_limiter,
            policies,
        }
    }
}

/// Split a wire client into request context and optional identifier.
fn client_parts(client: Option<ClientContext>) -> (RequestContext, Option<String>) {
    let client = client.unwrap_or_default();
    let context = RequestContext {
        forwarded_for: non_empty(client.forwarded_for),
        real_ip: non_empty(client.real_ip),
    };
    (context, non_empty(client.identifier))
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn to_timestamp(millis: u64) -> prost_types::Timestamp {
    let millis = i64::try_from(millis).unwrap_or(i64::MAX);
    prost_types::Timestamp {
        seconds: millis.div_euclid(1000),
        nanos: (millis.rem_euclid(1000) * 1_000_000) as i32,
    }
}

fn to_response(decision: &RateLimitDecision) -> CheckResponse {
    CheckResponse {
        allowed: decision.allowed,
        remaining_attempts: decision.remaining_attempts,
        reset_time: Some(to_timestamp(decision.reset_time)),
        blocked: decision.blocked,
        message: if decision.allowed {
            String::new()
        } else {
            rejection_message(decision).to_string()
        },
    }
}

#[tonic::async_trait]
impl GuardService for GuardServiceImpl {
    /// Count one attempt against the named policy.
    #[instrument(skip(self, request), fields(policy = %request.get_ref().policy))]
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        let req = request.into_inner();

        if req.policy.is_empty() {
            warn!("Received check request without a policy");
            return Err(Status::invalid_argument("policy is required"));
        }

        let Some(policy) = self.policies.get(&req.policy) else {
            warn!(policy = %req.policy, "Received check request for unknown policy");
            return Err(Status::not_found(format!("unknown policy '{}'", req.policy)));
        };

        let (context, identifier) = client_parts(req.client);
        let decision = match identifier {
            Some(id) => self
                .rate_limiter
                .check(&context, &policy.clone().with_identifier(id)),
            None => self.rate_limiter.check(&context, policy),
        };

        if decision.allowed {
            debug!(
                remaining = decision.remaining_attempts,
                "Attempt allowed"
            );
        } else {
            info!(
                blocked = decision.blocked,
                reset_time = decision.reset_time,
                "Attempt refused"
            );
        }

        Ok(Response::new(to_response(&decision)))
    }

    /// Clear the client's recorded attempts.
    #[instrument(skip(self, request))]
    async fn reset(
        &self,
        request: Request<ResetRequest>,
    ) -> Result<Response<ResetResponse>, Status> {
        let (context, identifier) = client_parts(request.into_inner().client);
        self.rate_limiter.reset(&context, identifier.as_deref());
        Ok(Response::new(ResetResponse {}))
    }
}
