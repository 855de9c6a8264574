//! Checksum verification for API routes.
//!
//! Collects the request's parameters (query string, then a form-encoded POST
//! body), verifies the checksum over all of them against every configured
//! secret, and stores the parsed parameters in request extensions as
//! `ApiParams`.

use crate::auth::checksum::{self, ChecksumError};
use crate::config::Config;
use crate::errors::LbError;
use crate::models::RequestParams;
use crate::observability::metrics;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::instrument;

/// Largest POST body read for parameters.
const MAX_BODY_BYTES: usize = 1024 * 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Verified request parameters, available to handlers behind the middleware.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiParams {
    pub action: String,
    pub params: RequestParams,
}

/// The API action named by the last path segment.
fn action_from_path(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

fn is_form(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with(FORM_CONTENT_TYPE))
}

/// Query params followed by body params, as one signed string.
fn join_signed(query: &str, body: &str) -> String {
    match (query.is_empty(), body.is_empty()) {
        (_, true) => query.to_string(),
        (true, false) => body.to_string(),
        (false, false) => format!("{query}&{body}"),
    }
}

/// Checksum middleware.
///
/// # Response
///
/// - Renders a `checksumError` envelope if the checksum is missing or wrong
/// - Continues to the handler with `ApiParams` in extensions otherwise
#[instrument(skip_all, name = "lb.middleware.checksum")]
pub async fn verify_checksum(
    State(config): State<Arc<Config>>,
    req: Request,
    next: Next,
) -> Response {
    let action = action_from_path(req.uri().path());
    let raw_query = req.uri().query().unwrap_or_default().to_string();
    let (mut signed, mut supplied) = checksum::split_checksum(&raw_query);

    let form_body = req.method() == Method::POST && is_form(&req);
    let (parts, body) = req.into_parts();
    let mut req = if form_body {
        let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(target: "lb.middleware.checksum", error = %e, "Failed to read request body");
                return LbError::Checksum("unreadable body".to_string()).into_response();
            }
        };
        let raw_body = String::from_utf8_lossy(&bytes).into_owned();
        let (body_signed, body_supplied) = checksum::split_checksum(&raw_body);
        // The checksum covers body params as well as query params.
        signed = join_signed(&signed, &body_signed);
        supplied = supplied.or(body_supplied);
        Request::from_parts(parts, Body::from(bytes))
    } else {
        Request::from_parts(parts, body)
    };
    let params = RequestParams::parse(&signed);

    let supplied = supplied.unwrap_or_default();
    if let Err(e) = checksum::verify(&action, &signed, &supplied, &config.api_secrets) {
        let reason = match e {
            ChecksumError::Missing => "missing",
            ChecksumError::UnsupportedAlgorithm => "unsupported_algorithm",
            ChecksumError::Mismatch => "mismatch",
        };
        metrics::record_checksum_failure(reason);
        return LbError::Checksum(e.to_string()).into_response();
    }

    req.extensions_mut().insert(ApiParams { action, params });
    next.run(req).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::ChecksumAlgorithm;
    use axum::http::Request as HttpRequest;
    use axum::{middleware, routing::get, Extension, Router};
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn config() -> Arc<Config> {
        let vars = HashMap::from([
            ("LB_STORE".to_string(), "memory".to_string()),
            ("LOADBALANCER_SECRET".to_string(), "primary".to_string()),
            ("LOADBALANCER_SECRETS".to_string(), "old".to_string()),
        ]);
        Arc::new(Config::from_vars(&vars).unwrap())
    }

    async fn echo(Extension(api): Extension<ApiParams>) -> String {
        format!("{}:{}", api.action, api.params.to_query())
    }

    fn app() -> Router {
        Router::new()
            .route("/bigbluebutton/api/:action", get(echo).post(echo))
            .route_layer(middleware::from_fn_with_state(config(), verify_checksum))
    }

    async fn send(req: Request) -> String {
        let response = app().oneshot(req).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn sign(action: &str, query: &str, secret: &str, algorithm: ChecksumAlgorithm) -> String {
        checksum::compute(algorithm, action, query, secret)
    }

    #[test]
    fn test_action_from_path() {
        assert_eq!(action_from_path("/bigbluebutton/api/create"), "create");
        assert_eq!(action_from_path("/bigbluebutton/api/getMeetings/"), "getMeetings");
    }

    #[tokio::test]
    async fn test_valid_get_checksum_passes_params() {
        let query = "meetingID=m1&name=Room+A";
        let sum = sign("getMeetingInfo", query, "primary", ChecksumAlgorithm::Sha1);
        let req = HttpRequest::builder()
            .uri(format!("/bigbluebutton/api/getMeetingInfo?{query}&checksum={sum}"))
            .body(Body::empty())
            .unwrap();

        assert_eq!(send(req).await, "getMeetingInfo:meetingID=m1&name=Room+A");
    }

    #[tokio::test]
    async fn test_rotated_secret_and_sha256_accepted() {
        let query = "meetingID=m1";
        let sum = sign("end", query, "old", ChecksumAlgorithm::Sha256);
        let req = HttpRequest::builder()
            .uri(format!("/bigbluebutton/api/end?checksum={sum}&{query}"))
            .body(Body::empty())
            .unwrap();

        assert_eq!(send(req).await, "end:meetingID=m1");
    }

    #[tokio::test]
    async fn test_missing_or_wrong_checksum_rejected() {
        let req = HttpRequest::builder()
            .uri("/bigbluebutton/api/getMeetings")
            .body(Body::empty())
            .unwrap();
        assert!(send(req).await.contains("<messageKey>checksumError</messageKey>"));

        let req = HttpRequest::builder()
            .uri(format!("/bigbluebutton/api/getMeetings?checksum={}", "x".repeat(40)))
            .body(Body::empty())
            .unwrap();
        assert!(send(req).await.contains("<messageKey>checksumError</messageKey>"));
    }

    #[tokio::test]
    async fn test_checksum_is_bound_to_action() {
        let sum = sign("getMeetings", "", "primary", ChecksumAlgorithm::Sha1);
        let req = HttpRequest::builder()
            .uri(format!("/bigbluebutton/api/getRecordings?checksum={sum}"))
            .body(Body::empty())
            .unwrap();
        assert!(send(req).await.contains("checksumError"));
    }

    #[tokio::test]
    async fn test_post_form_body_params_merge_after_query() {
        let body = "name=Room+B";
        let query = "meetingID=m1";
        let sum = sign("create", &format!("{query}&{body}"), "primary", ChecksumAlgorithm::Sha1);
        let req = HttpRequest::builder()
            .method("POST")
            .uri(format!("/bigbluebutton/api/create?{query}&checksum={sum}"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();

        assert_eq!(send(req).await, "create:meetingID=m1&name=Room+B");
    }

    #[tokio::test]
    async fn test_unsigned_body_params_rejected() {
        let query = "meetingID=m1&fullName=Bob";
        let sum = sign("join", query, "primary", ChecksumAlgorithm::Sha1);
        let req = HttpRequest::builder()
            .method("POST")
            .uri(format!("/bigbluebutton/api/join?{query}&checksum={sum}"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("role=MODERATOR"))
            .unwrap();

        assert!(send(req).await.contains("<messageKey>checksumError</messageKey>"));
    }

    #[tokio::test]
    async fn test_unsigned_query_params_rejected_when_checksum_in_body() {
        let signed = "meetingID=m1";
        let sum = sign("create", signed, "primary", ChecksumAlgorithm::Sha1);
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/bigbluebutton/api/create?name=Injected")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!("{signed}&checksum={sum}")))
            .unwrap();

        assert!(send(req).await.contains("checksumError"));
    }

    #[test]
    fn test_join_signed() {
        assert_eq!(join_signed("a=1", ""), "a=1");
        assert_eq!(join_signed("", "b=2"), "b=2");
        assert_eq!(join_signed("a=1", "b=2"), "a=1&b=2");
    }

    #[tokio::test]
    async fn test_post_checksum_in_body() {
        let signed = "meetingID=m1";
        let sum = sign("create", signed, "primary", ChecksumAlgorithm::Sha1);
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/bigbluebutton/api/create")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!("{signed}&checksum={sum}")))
            .unwrap();

        assert_eq!(send(req).await, "create:meetingID=m1");
    }
}
