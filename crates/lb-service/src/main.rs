//! Conferencing Load Balancer
//!
//! Entry point for the gateway binary.

use lb_service::config::{Config, StoreKind};
use lb_service::observability::metrics::init_metrics_recorder;
use lb_service::repositories::{InMemoryRecordingCatalog, InMemoryStore, RedisStore, RegistryStore};
use lb_service::routes::{self, AppState};
use lb_service::services::BackendClient;
use lb_service::tasks::start_server_poller;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lb_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting conferencing load balancer");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        store = ?config.store,
        url_host = %config.url_host,
        secrets = config.api_secrets.len(),
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    let store: Arc<dyn RegistryStore> = match (config.store, config.redis_url.as_deref()) {
        (StoreKind::Redis, Some(redis_url)) => {
            info!("Connecting to Redis...");
            let store = RedisStore::connect(redis_url).await.map_err(|e| {
                error!("Failed to connect to Redis: {}", e);
                e
            })?;
            info!("Redis connection established");
            Arc::new(store)
        }
        (StoreKind::Redis, None) => return Err("REDIS_URL is required for the redis store".into()),
        (StoreKind::Memory, _) => {
            warn!("Using in-memory registry store; state is not shared between instances");
            Arc::new(InMemoryStore::new())
        }
    };

    let bind_address = config.bind_address.clone();
    let poll_interval = config.poll_interval;
    let config = Arc::new(config);

    let state = Arc::new(AppState::new(
        Arc::clone(&config),
        Arc::clone(&store),
        Arc::new(InMemoryRecordingCatalog::new()),
    )?);

    let cancel_token = CancellationToken::new();
    let poller = tokio::spawn(start_server_poller(
        Arc::clone(&store),
        BackendClient::new(&config)?,
        poll_interval,
        cancel_token.child_token(),
    ));

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Load balancer listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel_token.cancel();
    if let Err(e) = poller.await {
        warn!("Server poller did not shut down cleanly: {}", e);
    }

    info!("Load balancer shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    let drain_secs: u64 = std::env::var("LB_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (LB_DRAIN_SECONDS=0)");
    }
}
