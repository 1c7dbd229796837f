//! Shared library for cross-cutting concerns in the key vault sample.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability and status-code classification
//! - HTTP client configuration and building
//! - Classified retry policies with exponential backoff
//! - Tracing subscriber setup

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod retry;
pub mod tracing_config;

pub use error::{PlatformError, StatusClassified};
pub use http::{HttpConfig, build_http_client, check_status};
pub use retry::{Decision, Outcome, RetryConfig, RetryError, RetryPolicy};
pub use tracing_config::{TracingConfig, init_tracing};
