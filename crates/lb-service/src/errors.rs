//! Gateway error types.
//!
//! Protocol errors render as a `FAILED` XML envelope with HTTP 200, which is
//! what conferencing API clients expect. Messages returned to callers are
//! fixed strings; the underlying cause is logged server-side.

use crate::xml::ApiResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Message returned when a per-meeting backend call fails.
pub const UNABLE_TO_ACCESS_MEETING: &str = "Unable to access meeting on server.";

/// Message returned when a pool-wide backend call fails.
pub const UNABLE_TO_ACCESS_SERVER: &str = "Unable to access server.";

/// Message returned when a backend create call fails.
pub const UNABLE_TO_CREATE_MEETING: &str = "Unable to create meeting on server.";

/// Gateway error type.
///
/// All variants except `Unauthorized` are protocol-visible and rendered as
/// `<returncode>FAILED</returncode>` with a message key.
#[derive(Debug, Error)]
pub enum LbError {
    #[error("meetingID parameter missing")]
    MissingMeetingId,

    #[error("recordID parameter missing")]
    MissingRecordId,

    #[error("publish parameter missing")]
    MissingPublish,

    #[error("meetingID or recordID filter required")]
    MissingRecordingFilter,

    #[error("Meeting not found")]
    MeetingNotFound,

    #[error("Recording not found")]
    RecordingNotFound,

    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("No available servers")]
    Capacity,

    #[error("Checksum error: {0}")]
    Checksum(String),

    /// Backend unreachable, timed out, or replied with something we must
    /// not forward. The message is the fixed text shown to the caller.
    #[error("Internal error: {0}")]
    Internal(&'static str),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Unauthorized")]
    Unauthorized,
}

impl LbError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            LbError::Unauthorized => 401,
            _ => 200,
        }
    }

    /// Protocol message key and caller-facing message.
    pub fn protocol_message(&self) -> (&'static str, &'static str) {
        match self {
            LbError::MissingMeetingId => (
                "missingParamMeetingID",
                "You must specify a meeting ID for the meeting.",
            ),
            LbError::MissingRecordId => (
                "missingParamRecordID",
                "You must specify one or more a record IDs.",
            ),
            LbError::MissingPublish => (
                "missingParamPublish",
                "You must specify one a publish value true or false.",
            ),
            LbError::MissingRecordingFilter => (
                "missingParameters",
                "param meetingID or recordID must be included.",
            ),
            LbError::MeetingNotFound => (
                "notFound",
                "We could not find a meeting with that meeting ID - perhaps the meeting is not yet running?",
            ),
            LbError::RecordingNotFound => ("notFound", "We could not find recordings"),
            LbError::ServerUnavailable(_) => (
                "serverUnavailable",
                "The server that was hosting the meeting is not available.",
            ),
            LbError::Capacity => ("internalError", "Could not find any available servers."),
            LbError::Checksum(_) => ("checksumError", "Checksums do not match"),
            LbError::Internal(message) => ("internalError", *message),
            LbError::Store(_) => ("internalError", "An internal error occurred."),
            LbError::Unauthorized => ("unauthorized", "Unauthorized"),
        }
    }
}

impl IntoResponse for LbError {
    fn into_response(self) -> Response {
        match &self {
            LbError::Store(detail) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "lb.store", error = %detail, "Registry store operation failed");
            }
            LbError::ServerUnavailable(server_id) => {
                tracing::warn!(target: "lb.availability", server_id = %server_id, "Owning server unavailable");
            }
            LbError::Capacity => {
                tracing::warn!(target: "lb.availability", "No server eligible for placement");
            }
            LbError::Checksum(reason) => {
                tracing::debug!(target: "lb.auth", reason = %reason, "Checksum rejected");
            }
            LbError::Unauthorized => {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            _ => {}
        }

        let (message_key, message) = self.protocol_message();
        ApiResponse::failed(message_key, message).into_response()
    }
}

impl From<redis::RedisError> for LbError {
    fn from(err: redis::RedisError) -> Self {
        LbError::Store(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body(body: Body) -> String {
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_display() {
        assert_eq!(LbError::MeetingNotFound.to_string(), "Meeting not found");
        assert_eq!(
            LbError::Internal(UNABLE_TO_ACCESS_SERVER).to_string(),
            "Internal error: Unable to access server."
        );
        assert_eq!(
            LbError::Store("connection refused".to_string()).to_string(),
            "Store error: connection refused"
        );
    }

    #[test]
    fn test_protocol_messages() {
        assert_eq!(
            LbError::MissingMeetingId.protocol_message(),
            (
                "missingParamMeetingID",
                "You must specify a meeting ID for the meeting."
            )
        );
        assert_eq!(
            LbError::Capacity.protocol_message(),
            ("internalError", "Could not find any available servers.")
        );
        assert_eq!(
            LbError::Internal(UNABLE_TO_ACCESS_MEETING).protocol_message(),
            ("internalError", "Unable to access meeting on server.")
        );
        assert_eq!(
            LbError::Checksum("mismatch".to_string()).protocol_message().0,
            "checksumError"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(LbError::MeetingNotFound.status_code(), 200);
        assert_eq!(LbError::Capacity.status_code(), 200);
        assert_eq!(LbError::Unauthorized.status_code(), 401);
    }

    #[tokio::test]
    async fn test_into_response_renders_failed_envelope() {
        let response = LbError::MeetingNotFound.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            crate::xml::XML_CONTENT_TYPE
        );

        let body = read_body(response.into_body()).await;
        assert!(body.contains("<returncode>FAILED</returncode>"));
        assert!(body.contains("<messageKey>notFound</messageKey>"));
    }

    #[tokio::test]
    async fn test_store_error_does_not_leak_detail() {
        let response = LbError::Store("redis://:hunter2@10.0.0.1 refused".to_string()).into_response();
        let body = read_body(response.into_body()).await;

        assert!(!body.contains("hunter2"));
        assert!(body.contains("<messageKey>internalError</messageKey>"));
        assert!(body.contains("<message>An internal error occurred.</message>"));
    }

    #[tokio::test]
    async fn test_unauthorized_is_plain_401() {
        let response = LbError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
