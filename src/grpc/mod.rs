//! gRPC front end for out-of-process callers.

mod server;
mod service;

pub use server::GrpcServer;
pub use service::GuardServiceImpl;

// Include the generated protobuf code
pub mod proto {
    pub mod marketguard {
        pub mod v1 {
            tonic::include_proto!("marketguard.v1");
        }
    }
}

// Re-export commonly used types
pub use proto::marketguard::v1::{
    guard_service_server::GuardServiceServer, CheckRequest, CheckResponse, ClientContext,
    ResetRequest, ResetResponse,
};
