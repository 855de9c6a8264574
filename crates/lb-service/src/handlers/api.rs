//! Meeting API handlers.
//!
//! - `GET /bigbluebutton/api` - index (no checksum)
//! - `create`, `join`, `end`, `getMeetingInfo`, `isMeetingRunning`,
//!   `getMeetings` - behind the checksum middleware, GET or POST
//!
//! Handlers only unpack `ApiParams` and turn service results into XML
//! responses; protocol errors render through `LbError`.

use crate::errors::LbError;
use crate::middleware::ApiParams;
use crate::routes::AppState;
use crate::services::ProxyReply;
use crate::xml::{xml_response, ApiResponse, XmlNode};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use std::sync::Arc;
use tracing::instrument;

/// Protocol version reported by the index call.
pub const API_VERSION: &str = "2.0";

impl IntoResponse for ProxyReply {
    fn into_response(self) -> Response {
        match self {
            ProxyReply::Passthrough(body) => xml_response(body),
            ProxyReply::Generated(response) => response.into_response(),
        }
    }
}

/// Handler for GET /bigbluebutton/api
pub async fn index(State(state): State<Arc<AppState>>) -> ApiResponse {
    let mut children = vec![XmlNode::text("version", API_VERSION)];
    if let Some(build) = &state.config.build_number {
        children.push(XmlNode::text("build", build.clone()));
    }
    ApiResponse::success(children)
}

/// Handler for GET|POST /bigbluebutton/api/create
#[instrument(skip_all, name = "lb.handler.create")]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(api): Extension<ApiParams>,
) -> Result<ProxyReply, LbError> {
    state.proxy.create(&api.params).await
}

/// Handler for GET|POST /bigbluebutton/api/join
///
/// Answers HTTP 302 to the owning server's signed join URL.
#[instrument(skip_all, name = "lb.handler.join")]
pub async fn join(
    State(state): State<Arc<AppState>>,
    Extension(api): Extension<ApiParams>,
) -> Result<Response, LbError> {
    let url = state.proxy.join_url(&api.params).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

/// Handler for GET|POST /bigbluebutton/api/end
#[instrument(skip_all, name = "lb.handler.end")]
pub async fn end(
    State(state): State<Arc<AppState>>,
    Extension(api): Extension<ApiParams>,
) -> Result<ProxyReply, LbError> {
    state.proxy.end(&api.params).await
}

/// Handler for GET|POST /bigbluebutton/api/getMeetingInfo
#[instrument(skip_all, name = "lb.handler.get_meeting_info")]
pub async fn get_meeting_info(
    State(state): State<Arc<AppState>>,
    Extension(api): Extension<ApiParams>,
) -> Result<ProxyReply, LbError> {
    state.proxy.get_meeting_info(&api.params).await
}

/// Handler for GET|POST /bigbluebutton/api/isMeetingRunning
#[instrument(skip_all, name = "lb.handler.is_meeting_running")]
pub async fn is_meeting_running(
    State(state): State<Arc<AppState>>,
    Extension(api): Extension<ApiParams>,
) -> Result<ProxyReply, LbError> {
    state.proxy.is_meeting_running(&api.params).await
}

/// Handler for GET|POST /bigbluebutton/api/getMeetings
#[instrument(skip_all, name = "lb.handler.get_meetings")]
pub async fn get_meetings(State(state): State<Arc<AppState>>) -> Result<ProxyReply, LbError> {
    state.proxy.get_meetings().await
}
