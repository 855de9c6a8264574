//! HTTP client for backend conferencing servers.
//!
//! Every backend call is a signed `GET <server_url><action>?<query>&checksum=..`
//! regardless of how the gateway itself was called. Each call is bounded by
//! the configured request timeout, and a timeout is reported like any other
//! transport failure.
//!
//! The same client forwards analytics payloads to caller-supplied URLs.

use crate::auth::checksum::{self, ChecksumAlgorithm};
use crate::config::Config;
use crate::errors::LbError;
use crate::models::{RequestParams, Server};
use crate::observability::metrics;
use crate::xml::{parse_envelope, Envelope, XmlError};
use common::secret::ExposeSecret;
use reqwest::{header, Client};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

/// Failure of a single backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend call timed out")]
    Timeout,

    #[error("backend unreachable: {0}")]
    Transport(String),

    #[error("backend answered HTTP {0}")]
    Status(u16),

    #[error("backend reply rejected: {0}")]
    Malformed(#[from] XmlError),
}

impl BackendError {
    fn metric_status(&self) -> &'static str {
        match self {
            BackendError::Timeout => "timeout",
            _ => "error",
        }
    }
}

/// A parsed backend reply. `body` is kept verbatim for pass-through.
#[derive(Debug, Clone)]
pub struct BackendReply {
    pub body: String,
    pub envelope: Envelope,
}

/// Build the signed URL for `action` on `server`.
///
/// The checksum covers `action ++ encoded_query ++ secret`, where the query
/// is encoded exactly as it appears in the URL.
pub fn signed_url(
    server: &Server,
    action: &str,
    params: &RequestParams,
    algorithm: ChecksumAlgorithm,
) -> String {
    let query = params.to_query();
    let checksum = checksum::compute(algorithm, action, &query, server.secret.expose_secret());
    let base = if server.url.ends_with('/') {
        server.url.clone()
    } else {
        format!("{}/", server.url)
    };

    if query.is_empty() {
        format!("{base}{action}?checksum={checksum}")
    } else {
        format!("{base}{action}?{query}&checksum={checksum}")
    }
}

/// Client used for every outbound call.
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    algorithm: ChecksumAlgorithm,
}

impl BackendClient {
    /// Create a client with the configured timeouts and checksum algorithm.
    ///
    /// # Errors
    ///
    /// Returns `LbError::Internal` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, LbError> {
        let client = Client::builder()
            .timeout(config.backend_request_timeout)
            .connect_timeout(config.backend_connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                error!(target: "lb.services.backend", error = %e, "Failed to build HTTP client");
                LbError::Internal("Failed to build HTTP client.")
            })?;

        Ok(Self {
            client,
            algorithm: config.backend_checksum_algorithm,
        })
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Issue one signed GET to `server` and parse its envelope.
    ///
    /// A `FAILED` envelope is a successful call; callers decide what it means.
    #[instrument(skip_all, fields(server_id = %server.id, action = %action))]
    pub async fn call(
        &self,
        server: &Server,
        action: &str,
        params: &RequestParams,
    ) -> Result<BackendReply, BackendError> {
        let url = signed_url(server, action, params, self.algorithm);
        let start = Instant::now();

        let result = self.fetch(&url).await;

        let status = match &result {
            Ok(reply) if reply.envelope.is_success() => "success",
            Ok(_) => "failed",
            Err(e) => e.metric_status(),
        };
        metrics::record_backend_call(action, status, start.elapsed());

        if let Err(e) = &result {
            warn!(target: "lb.services.backend", server_id = %server.id, action = %action, error = %e, "Backend call failed");
        }
        result
    }

    /// GET the server's unsigned index document.
    #[instrument(skip_all, fields(server_id = %server.id))]
    pub async fn check_health(&self, server: &Server) -> Result<BackendReply, BackendError> {
        let start = Instant::now();
        let result = self.fetch(&server.url).await;

        let status = match &result {
            Ok(reply) if reply.envelope.is_success() => "success",
            Ok(_) => "failed",
            Err(e) => e.metric_status(),
        };
        metrics::record_backend_call("index", status, start.elapsed());
        result
    }

    async fn fetch(&self, url: &str) -> Result<BackendReply, BackendError> {
        let response = self.client.get(url).send().await.map_err(map_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(map_transport)?;
        let envelope = parse_envelope(&body)?;
        Ok(BackendReply { body, envelope })
    }

    /// POST a payload to a caller-supplied callback URL.
    ///
    /// Returns the HTTP status the receiver answered with.
    #[instrument(skip_all)]
    pub async fn post_callback(
        &self,
        url: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<u16, BackendError> {
        let start = Instant::now();
        let result = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map(|response| response.status().as_u16())
            .map_err(map_transport);

        let status = match &result {
            Ok(code) if (200..300).contains(code) => "success",
            Ok(_) => "failed",
            Err(e) => e.metric_status(),
        };
        metrics::record_backend_call("analytics_callback", status, start.elapsed());
        debug!(target: "lb.services.backend", status, "Analytics callback delivered");

        result
    }
}

fn map_transport(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(e.to_string())
    }
}
