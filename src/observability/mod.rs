//! # Observability Infrastructure
//!
//! Structured logging, per-call gRPC tracing and the readiness endpoint.

pub mod grpc_tracing;
pub mod health;
pub mod logging;

pub use grpc_tracing::GrpcTracingLayer;
pub use health::{health_router, parse_health_address, serve_health, start_health_server};
pub use logging::{init_logging, LogFormat};
