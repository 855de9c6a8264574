//! Background tasks for the gateway.
//!
//! - `server_poller` - checks each backend and records whether it is online

pub mod server_poller;

pub use server_poller::start_server_poller;
