//! HTTP routes for the gateway.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::errors::LbError;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, verify_checksum};
use crate::repositories::{RecordingCatalog, RegistryStore};
use crate::services::{AnalyticsForwarder, BackendClient, ProxyService, RecordingService};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Prefix of every protocol route.
pub const API_PREFIX: &str = "/bigbluebutton/api";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Arc<Config>,

    /// Registry store behind the server pool and meeting registry.
    pub store: Arc<dyn RegistryStore>,

    /// Placement, proxying and fan-out.
    pub proxy: ProxyService,

    /// Recording catalog actions.
    pub recordings: RecordingService,

    /// Analytics callback forwarding.
    pub analytics: AnalyticsForwarder,
}

impl AppState {
    /// Wire services over the given store and recording catalog.
    ///
    /// # Errors
    ///
    /// Returns `LbError::Internal` if the backend HTTP client cannot be built.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn RegistryStore>,
        catalog: Arc<dyn RecordingCatalog>,
    ) -> Result<Self, LbError> {
        let backend = BackendClient::new(&config)?;

        Ok(Self {
            proxy: ProxyService::new(Arc::clone(&config), Arc::clone(&store), backend.clone()),
            recordings: RecordingService::new(catalog, Arc::clone(&config)),
            analytics: AnalyticsForwarder::new(Arc::clone(&store), backend),
            config,
            store,
        })
    }
}

/// Build the application routes.
///
/// - `/health`, `/ready`, `/metrics` - operational endpoints, public
/// - `/bigbluebutton/api` - index, public
/// - `/bigbluebutton/api/analytics_callback` - bearer token checked by the handler
/// - every other API action - GET or POST behind the checksum middleware
///
/// Layered with TraceLayer, a 30 second request timeout and HTTP metrics.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route(API_PREFIX, get(handlers::index).post(handlers::index))
        .route(&format!("{API_PREFIX}/"), get(handlers::index).post(handlers::index))
        .route(
            &format!("{API_PREFIX}/analytics_callback"),
            post(handlers::analytics_callback),
        )
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let api = |action: &str| format!("{API_PREFIX}/{action}");
    let protected_routes = Router::new()
        .route(&api("create"), get(handlers::create).post(handlers::create))
        .route(&api("join"), get(handlers::join).post(handlers::join))
        .route(&api("end"), get(handlers::end).post(handlers::end))
        .route(
            &api("getMeetingInfo"),
            get(handlers::get_meeting_info).post(handlers::get_meeting_info),
        )
        .route(
            &api("isMeetingRunning"),
            get(handlers::is_meeting_running).post(handlers::is_meeting_running),
        )
        .route(
            &api("getMeetings"),
            get(handlers::get_meetings).post(handlers::get_meetings),
        )
        .route(
            &api("getRecordings"),
            get(handlers::get_recordings).post(handlers::get_recordings),
        )
        .route(
            &api("publishRecordings"),
            get(handlers::publish_recordings).post(handlers::publish_recordings),
        )
        .route(
            &api("updateRecordings"),
            get(handlers::update_recordings).post(handlers::update_recordings),
        )
        .route(
            &api("deleteRecordings"),
            get(handlers::delete_recordings).post(handlers::delete_recordings),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            verify_checksum,
        ))
        .with_state(state);

    // Later layers wrap earlier ones: http_metrics_middleware is outermost
    // and sees every response, including timeouts.
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
