//! Observability for the gateway.
//!
//! Provides metrics definitions and instrumentation helpers.

pub mod metrics;
