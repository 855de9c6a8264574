//! Analytics callback handler.
//!
//! Backends POST meeting analytics to the gateway URL that replaced the
//! caller's `meta_analytics-callback-url` at create time. The payload is
//! re-posted to the caller's original URL.
//!
//! # Security
//!
//! Requests carry `Authorization: Bearer <jwt>` signed with one of the
//! gateway's API secrets. Anything else is rejected with 401 before the body
//! is inspected.

use crate::auth::analytics_token;
use crate::errors::LbError;
use crate::models::RequestParams;
use crate::routes::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use std::sync::Arc;
use tracing::{debug, instrument};

const MEETING_ID_FIELD: &str = "meeting_id";
const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Meeting id from a JSON or form-encoded analytics payload.
fn meeting_id_from_body(content_type: &str, body: &[u8]) -> Option<String> {
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let params = RequestParams::parse(&String::from_utf8_lossy(body));
        return params.get_non_empty(MEETING_ID_FIELD).map(str::to_string);
    }

    serde_json::from_slice::<serde_json::Value>(body)
        .ok()?
        .get(MEETING_ID_FIELD)?
        .as_str()
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
}

/// Handler for POST /bigbluebutton/api/analytics_callback
///
/// # Response
///
/// - 401 if the bearer token is missing or invalid
/// - 204 otherwise, whether or not a callback URL was on record
#[instrument(skip_all, name = "lb.handler.analytics_callback")]
pub async fn analytics_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, LbError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(analytics_token::bearer_token)
        .ok_or(LbError::Unauthorized)?;

    if !analytics_token::verify(token, &state.config.api_secrets) {
        return Err(LbError::Unauthorized);
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let Some(meeting_id) = meeting_id_from_body(&content_type, &body) else {
        debug!(target: "lb.handler.analytics", "Analytics payload without meeting_id");
        return Ok(StatusCode::NO_CONTENT);
    };

    state
        .analytics
        .forward(&meeting_id, &content_type, body.to_vec())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
