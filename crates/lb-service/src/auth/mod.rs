//! Request authentication.
//!
//! - `checksum` - Shared-secret checksums on API calls (inbound and outbound)
//! - `analytics_token` - Bearer JWTs on the analytics callback

pub mod analytics_token;
pub mod checksum;

pub use checksum::{ChecksumAlgorithm, ChecksumError};
