//! Server poller background task.
//!
//! Every poll interval, each known server's index document is fetched with
//! the backend request timeout. A `SUCCESS` reply marks the server online;
//! anything else marks it offline, which removes it from placement and from
//! pool-wide reads.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is cancelled. A poll round in
//! progress finishes first.

use crate::errors::LbError;
use crate::observability::metrics;
use crate::repositories::RegistryStore;
use crate::services::BackendClient;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Check every server once and record the results.
///
/// Returns the number of servers now online.
pub async fn poll_once(
    store: &dyn RegistryStore,
    backend: &BackendClient,
) -> Result<usize, LbError> {
    let servers = store.list_servers().await?;

    let checks = servers.iter().map(|server| async move {
        let online = matches!(backend.check_health(server).await, Ok(reply) if reply.envelope.is_success());
        (server, online)
    });

    let mut online_count = 0;
    for (server, online) in join_all(checks).await {
        if online != server.online {
            if online {
                info!(target: "lb.task.poller", server_id = %server.id, "Server came online");
            } else {
                warn!(target: "lb.task.poller", server_id = %server.id, "Server went offline");
            }
        }
        store.set_server_online(&server.id, online).await?;
        if online {
            online_count += 1;
        }
    }

    metrics::set_servers_online(online_count);
    Ok(online_count)
}

/// Run the poll loop until `cancel_token` is cancelled.
pub async fn start_server_poller(
    store: Arc<dyn RegistryStore>,
    backend: BackendClient,
    poll_interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(target: "lb.task.poller", interval_secs = poll_interval.as_secs(), "Server poller started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = poll_once(store.as_ref(), &backend).await {
                    tracing::error!(target: "lb.task.poller", error = %e, "Server poll round failed");
                }
            }
            _ = cancel_token.cancelled() => {
                info!(target: "lb.task.poller", "Server poller received shutdown signal, exiting");
                break;
            }
        }
    }
}
