//! Service layer for the gateway.
//!
//! Services hold the gateway's behavior; handlers only translate HTTP to
//! service calls and repositories only persist state.
//!
//! - `proxy` - create placement, per-meeting proxying, getMeetings fan-out, join
//! - `param_pipeline` - parameter rewriting for create and join
//! - `server_pool`, `meeting_registry`, `callback_registry` - registry views
//! - `backend_client` - signed calls to backend servers
//! - `recordings` - recording catalog actions
//! - `analytics` - analytics callback forwarding

pub mod analytics;
pub mod backend_client;
pub mod callback_registry;
pub mod meeting_registry;
pub mod param_pipeline;
pub mod proxy;
pub mod recordings;
pub mod server_pool;

pub use analytics::{AnalyticsForwarder, ForwardOutcome};
pub use backend_client::{BackendClient, BackendError, BackendReply};
pub use callback_registry::CallbackRegistry;
pub use meeting_registry::MeetingRegistry;
pub use proxy::{ProxyReply, ProxyService};
pub use recordings::RecordingService;
pub use server_pool::ServerPool;
