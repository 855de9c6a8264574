//! Metrics definitions for the gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `lb_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: HTTP methods
//! - `endpoint`: API actions plus a handful of static paths, everything else `/other`
//! - `action`: backend API actions issued by the gateway
//! - `status`: small fixed sets per metric (success, error, timeout, ...)
//!
//! Server ids and meeting ids are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// API prefix shared by every protocol route.
const API_PREFIX: &str = "/bigbluebutton/api";

/// API actions exposed under `API_PREFIX`.
const API_ACTIONS: &[&str] = &[
    "create",
    "join",
    "end",
    "getMeetingInfo",
    "isMeetingRunning",
    "getMeetings",
    "getRecordings",
    "publishRecordings",
    "updateRecordings",
    "deleteRecordings",
    "analytics_callback",
];

/// Install the global Prometheus recorder and return its handle for `/metrics`.
///
/// Must be called once per process, before any metric is recorded.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("lb_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Backend calls are bounded by the request timeout, 10s by default
        .set_buckets_for_metric(
            Matcher::Prefix("lb_backend_call".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set backend call buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `lb_http_requests_total`, `lb_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// Protocol failures are HTTP 200 and count as `success` here; they are
/// visible through the backend and placement metrics instead.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("lb_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("lb_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/redirect/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        300..=399 => "redirect",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/ready" | "/metrics" => path.to_string(),
        API_PREFIX | "/bigbluebutton/api/" => API_PREFIX.to_string(),
        _ => normalize_api_endpoint(path),
    }
}

/// Known API actions keep their name, anything else becomes `/other`.
fn normalize_api_endpoint(path: &str) -> String {
    path.strip_prefix(API_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|action| API_ACTIONS.contains(action))
        .map_or_else(|| "/other".to_string(), |action| format!("{API_PREFIX}/{action}"))
}

// ============================================================================
// Backend Call Metrics
// ============================================================================

/// Record one outbound call to a backend server
///
/// Metric: `lb_backend_calls_total`, `lb_backend_call_duration_seconds`
/// Labels: `action`, `status` (success, failed, error, timeout)
pub fn record_backend_call(action: &str, status: &str, duration: Duration) {
    histogram!("lb_backend_call_duration_seconds",
        "action" => action.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("lb_backend_calls_total",
        "action" => action.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Placement and Fan-out Metrics
// ============================================================================

/// Record a create call's placement outcome
///
/// Metric: `lb_placements_total`
/// Labels: `status` (placed, existing, replaced, stale, contended, no_capacity, reverted)
pub fn record_placement(status: &str) {
    counter!("lb_placements_total", "status" => status.to_string()).increment(1);
}

/// Record a pool-wide read
///
/// Metric: `lb_fanout_requests_total`
/// Labels: `status` (success, error, disabled)
pub fn record_fanout(status: &str) {
    counter!("lb_fanout_requests_total", "status" => status.to_string()).increment(1);
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record a rejected checksum
///
/// Metric: `lb_checksum_failures_total`
/// Labels: `reason` (missing, unsupported_algorithm, mismatch)
pub fn record_checksum_failure(reason: &str) {
    counter!("lb_checksum_failures_total", "reason" => reason.to_string()).increment(1);
}

// ============================================================================
// Pool Gauges
// ============================================================================

/// Set the number of servers that passed their last health check
///
/// Metric: `lb_servers_online`
pub fn set_servers_online(count: usize) {
    gauge!("lb_servers_online").set(count as f64);
}
