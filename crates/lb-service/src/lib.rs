//! Conferencing Load Balancer Library
//!
//! A gateway that presents a single conferencing-server API endpoint in front
//! of a pool of backend servers:
//!
//! - Checksum authentication of every API call
//! - Least-loaded placement of new meetings
//! - Routing of per-meeting calls to the owning server
//! - Pool-wide aggregation of `getMeetings`
//! - Signed join redirects
//!
//! # Architecture
//!
//! Handler -> Service -> Repository:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Request checksums and analytics bearer tokens
//! - `config` - Service configuration from environment
//! - `errors` - Protocol error envelope mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Checksum verification and HTTP metrics
//! - `models` - Servers, meetings, request parameters, recordings
//! - `observability` - Prometheus metrics
//! - `repositories` - Registry store and recording catalog
//! - `routes` - Axum router setup
//! - `services` - Placement, proxying, fan-out, recordings, analytics
//! - `tasks` - Background server poller
//! - `xml` - Response rendering and backend reply parsing

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
pub mod xml;
