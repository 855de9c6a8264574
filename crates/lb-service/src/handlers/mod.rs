//! HTTP request handlers for the gateway.

pub mod analytics;
pub mod api;
pub mod health;
pub mod metrics;
pub mod recordings;

pub use analytics::analytics_callback;
pub use api::{create, end, get_meeting_info, get_meetings, index, is_meeting_running, join};
pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use recordings::{delete_recordings, get_recordings, publish_recordings, update_recordings};
