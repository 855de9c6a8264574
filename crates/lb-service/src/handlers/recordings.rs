//! Recording action handlers.
//!
//! All four actions sit behind the checksum middleware and delegate to
//! `RecordingService`.

use crate::errors::LbError;
use crate::middleware::ApiParams;
use crate::routes::AppState;
use crate::xml::ApiResponse;
use axum::extract::State;
use axum::Extension;
use std::sync::Arc;

/// Handler for GET|POST /bigbluebutton/api/getRecordings
pub async fn get_recordings(
    State(state): State<Arc<AppState>>,
    Extension(api): Extension<ApiParams>,
) -> Result<ApiResponse, LbError> {
    state.recordings.get_recordings(&api.params).await
}

/// Handler for GET|POST /bigbluebutton/api/publishRecordings
pub async fn publish_recordings(
    State(state): State<Arc<AppState>>,
    Extension(api): Extension<ApiParams>,
) -> Result<ApiResponse, LbError> {
    state.recordings.publish_recordings(&api.params).await
}

/// Handler for GET|POST /bigbluebutton/api/updateRecordings
pub async fn update_recordings(
    State(state): State<Arc<AppState>>,
    Extension(api): Extension<ApiParams>,
) -> Result<ApiResponse, LbError> {
    state.recordings.update_recordings(&api.params).await
}

/// Handler for GET|POST /bigbluebutton/api/deleteRecordings
pub async fn delete_recordings(
    State(state): State<Arc<AppState>>,
    Extension(api): Extension<ApiParams>,
) -> Result<ApiResponse, LbError> {
    state.recordings.delete_recordings(&api.params).await
}
