//! `reqctx` server: an axum service whose every log line carries the
//! context of the request it was written for.

pub mod error;
pub mod network;
pub mod openapi;
pub mod service;
pub mod telemetry;

pub use error::ApiError;
pub use network::{NetworkConfig, NetworkModule};
pub use service::{ExecutorConfig, RejectionPolicy, ServerConfig};
pub use telemetry::LogFormat;
