//! # LB Test Utilities
//!
//! Shared test utilities for the load balancer service.
//!
//! This crate provides:
//! - Server test harness (`TestLbServer` for E2E tests over real HTTP)
//! - Backend fixtures (server records and canned backend XML for wiremock)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lb_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let backend = wiremock::MockServer::start().await;
//!     let server = TestLbServer::spawn(vec![test_server("bbb-1", &backend.uri(), 0)]).await?;
//!
//!     let response = server.client().get(server.api_url("getMeetings", "")).send().await?;
//! }
//! ```

pub mod backend_fixtures;
pub mod server_harness;

pub use backend_fixtures::*;
pub use server_harness::*;
