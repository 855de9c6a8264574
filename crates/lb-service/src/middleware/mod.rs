//! Middleware for the gateway.
//!
//! - `checksum` - Checksum verification for API routes
//! - `http_metrics` - HTTP request metrics for every response

pub mod checksum;
pub mod http_metrics;

pub use checksum::{verify_checksum, ApiParams};
pub use http_metrics::http_metrics_middleware;
