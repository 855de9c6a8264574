//! Test server harness for E2E testing
//!
//! Provides `TestLbServer` for spawning real gateway instances over an
//! in-memory registry store and recording catalog.

use lb_service::auth::checksum::{self, ChecksumAlgorithm};
use lb_service::config::Config;
use lb_service::models::{Recording, Server};
use lb_service::observability::metrics::init_metrics_recorder;
use lb_service::repositories::{InMemoryRecordingCatalog, InMemoryStore};
use lb_service::routes::{self, AppState};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// Secret callers use to sign requests to the test gateway.
pub const TEST_API_SECRET: &str = "test-api-secret";

/// Rotated secret also accepted by the test gateway.
pub const TEST_OLD_API_SECRET: &str = "test-old-api-secret";

static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Test harness for spawning the gateway in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_index() -> Result<()> {
///     let server = TestLbServer::spawn(vec![]).await?;
///     let response = reqwest::get(format!("{}/bigbluebutton/api", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestLbServer {
    addr: SocketAddr,
    store: InMemoryStore,
    catalog: InMemoryRecordingCatalog,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestLbServer {
    /// Spawn a gateway with `servers` in its pool and default configuration.
    pub async fn spawn(servers: Vec<Server>) -> Result<Self, anyhow::Error> {
        Self::spawn_with(servers, Vec::new(), &[]).await
    }

    /// Spawn a gateway with `servers`, `recordings` and extra environment
    /// variables layered over the test defaults.
    pub async fn spawn_with(
        servers: Vec<Server>,
        recordings: Vec<Recording>,
        extra_vars: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("LB_STORE".to_string(), "memory".to_string()),
            ("LOADBALANCER_SECRET".to_string(), TEST_API_SECRET.to_string()),
            (
                "LOADBALANCER_SECRETS".to_string(),
                TEST_OLD_API_SECRET.to_string(),
            ),
            ("URL_HOST".to_string(), "lb.example.com".to_string()),
            ("BACKEND_REQUEST_TIMEOUT_MS".to_string(), "1000".to_string()),
        ]);
        for (key, value) in extra_vars {
            vars.insert((*key).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let store = InMemoryStore::with_servers(servers);
        let catalog = InMemoryRecordingCatalog::with_recordings(recordings);

        let state = Arc::new(
            AppState::new(
                Arc::new(config.clone()),
                Arc::new(store.clone()),
                Arc::new(catalog.clone()),
            )
            .map_err(|e| anyhow::anyhow!("Failed to create app state: {}", e))?,
        );

        let app = routes::build_routes(state, test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            store,
            catalog,
            config,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The registry store behind the gateway.
    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// The recording catalog behind the gateway.
    pub fn catalog(&self) -> &InMemoryRecordingCatalog {
        &self.catalog
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Signed API URL for `action` with an already-encoded `query`.
    pub fn api_url(&self, action: &str, query: &str) -> String {
        self.api_url_with(action, query, TEST_API_SECRET, ChecksumAlgorithm::Sha1)
    }

    /// Signed API URL using a specific secret and digest.
    pub fn api_url_with(
        &self,
        action: &str,
        query: &str,
        secret: &str,
        algorithm: ChecksumAlgorithm,
    ) -> String {
        let checksum = checksum::compute(algorithm, action, query, secret);
        if query.is_empty() {
            format!("{}/bigbluebutton/api/{action}?checksum={checksum}", self.url())
        } else {
            format!("{}/bigbluebutton/api/{action}?{query}&checksum={checksum}", self.url())
        }
    }

    /// HTTP client that does not follow redirects.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("reqwest client should build")
    }
}

impl Drop for TestLbServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
