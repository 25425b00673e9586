//! Marketguard - abuse mitigation for the card marketplace
//!
//! This crate counts attempts at sensitive account operations (registration,
//! password change, login) per client and hard-blocks clients that exceed
//! their quota. The limiter is in-memory and single-process; it can be
//! embedded directly or reached over gRPC through the bundled server.

pub mod config;
pub mod error;
pub mod grpc;
pub mod ratelimit;
