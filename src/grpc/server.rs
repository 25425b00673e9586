//! gRPC server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tracing::{error, info};

use super::proto::marketguard::v1::guard_service_server::GuardServiceServer;
use super::service::GuardServiceImpl;
use crate::error::{MarketguardError, Result};
use crate::ratelimit::{PolicyTable, RateLimiter};

/// gRPC server for the guard service.
pub struct GrpcServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<RateLimiter>,
    /// Policies callers can name
    policies: Arc<PolicyTable>,
}

impl GrpcServer {
    /// Create a new gRPC server.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<RateLimiter>, policies: PolicyTable) -> Self {
        Self {
            addr,
            rate_limiter,
            policies: Arc::new(policies),
        }
    }

    /// Address the server binds to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn service(&self) -> GuardServiceServer<GuardServiceImpl> {
        GuardServiceServer::new(GuardServiceImpl::new(
            Arc::clone(&self.rate_limiter),
            Arc::clone(&self.policies),
        ))
    }

    /// Start the gRPC server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        info!(
            addr = %self.addr,
            policies = self.policies.len(),
            "Starting gRPC server for GuardService"
        );

        Server::builder()
            .add_service(self.service())
            .serve_with_shutdown(self.addr, signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                MarketguardError::Grpc(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let rate_limiter = Arc::new(RateLimiter::new());
        let server = GrpcServer::new(addr, rate_limiter, PolicyTable::with_presets());
        assert_eq!(server.addr(), addr);
    }

    #[tokio::test]
    async fn test_serve_stops_on_signal() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = GrpcServer::new(addr, Arc::new(RateLimiter::new()), PolicyTable::new());
        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }
}
