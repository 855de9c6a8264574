//! Server pool queries and placement selection.

use crate::errors::LbError;
use crate::models::{Meeting, PlacementOutcome, Server};
use crate::repositories::RegistryStore;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Pick the placeable server with the lowest load, ties broken by id.
pub fn select_lowest_load(servers: &[Server]) -> Option<&Server> {
    servers
        .iter()
        .filter(|s| s.is_placeable())
        .min_by(|a, b| a.load.cmp(&b.load).then_with(|| a.id.cmp(&b.id)))
}

/// Read and placement view over the registry's servers.
#[derive(Clone)]
pub struct ServerPool {
    store: Arc<dyn RegistryStore>,
}

impl ServerPool {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Servers that answer reads: online and enabled or cordoned, ordered by id.
    pub async fn list_eligible_for_read(&self) -> Result<Vec<Server>, LbError> {
        let mut servers = self.store.list_servers().await?;
        servers.retain(Server::is_readable);
        Ok(servers)
    }

    /// Lowest-load online enabled server.
    ///
    /// The choice may be outdated by the time it is recorded;
    /// `record_placement` rejects it then.
    #[instrument(skip_all)]
    pub async fn select_for_placement(&self) -> Result<Server, LbError> {
        let servers = self.store.list_servers().await?;
        let selected = select_lowest_load(&servers).cloned().ok_or(LbError::Capacity)?;
        debug!(target: "lb.service.pool", server_id = %selected.id, load = selected.load, "Selected server for placement");
        Ok(selected)
    }

    pub async fn get(&self, server_id: &str) -> Result<Option<Server>, LbError> {
        self.store.get_server(server_id).await
    }

    /// Write `meeting` and raise `server`'s load by its multiplier in one step.
    ///
    /// `server` is the record as selected; if its load has moved since, the
    /// outcome is `Stale` and the caller selects again.
    pub async fn record_placement(
        &self,
        server: &Server,
        meeting: &Meeting,
    ) -> Result<PlacementOutcome, LbError> {
        self.store
            .record_placement(meeting, server.load, server.load_increment())
            .await
    }

    /// Undo a placement whose backend create did not succeed.
    pub async fn revert_placement(&self, server: &Server, meeting_id: &str) -> Result<bool, LbError> {
        self.store
            .revert_placement(meeting_id, &server.id, server.load_increment())
            .await
    }
}
