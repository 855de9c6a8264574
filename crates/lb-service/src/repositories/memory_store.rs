//! Process-local registry store.
//!
//! Used for single-instance deployments and tests. Each operation holds the
//! lock for its whole read-modify-write, which gives the same per-operation
//! atomicity as the Lua scripts in the Redis store.

use crate::errors::LbError;
use crate::models::{CallbackAttributes, Meeting, PlacementOutcome, Server};
use crate::repositories::RegistryStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    servers: BTreeMap<String, Server>,
    meetings: HashMap<String, Meeting>,
    callbacks: HashMap<String, CallbackAttributes>,
}

/// In-memory registry store.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `servers`.
    pub fn with_servers(servers: impl IntoIterator<Item = Server>) -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.lock() {
            for server in servers {
                inner.servers.insert(server.id.clone(), server);
            }
        }
        store
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, LbError> {
        self.inner
            .lock()
            .map_err(|_| LbError::Store("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl RegistryStore for InMemoryStore {
    async fn list_servers(&self) -> Result<Vec<Server>, LbError> {
        Ok(self.lock()?.servers.values().cloned().collect())
    }

    async fn get_server(&self, server_id: &str) -> Result<Option<Server>, LbError> {
        Ok(self.lock()?.servers.get(server_id).cloned())
    }

    async fn put_server(&self, server: &Server) -> Result<(), LbError> {
        self.lock()?
            .servers
            .insert(server.id.clone(), server.clone());
        Ok(())
    }

    async fn set_server_online(&self, server_id: &str, online: bool) -> Result<(), LbError> {
        if let Some(server) = self.lock()?.servers.get_mut(server_id) {
            server.online = online;
        }
        Ok(())
    }

    async fn record_placement(
        &self,
        meeting: &Meeting,
        expected_load: i64,
        increment: i64,
    ) -> Result<PlacementOutcome, LbError> {
        let mut inner = self.lock()?;

        if let Some(existing) = inner.meetings.get(&meeting.id) {
            return Ok(PlacementOutcome::Existing {
                server_id: existing.server_id.clone(),
            });
        }

        let server = inner
            .servers
            .get_mut(&meeting.server_id)
            .ok_or_else(|| LbError::ServerUnavailable(meeting.server_id.clone()))?;
        if server.load != expected_load {
            return Ok(PlacementOutcome::Stale);
        }
        server.load += increment;

        inner.meetings.insert(meeting.id.clone(), meeting.clone());
        Ok(PlacementOutcome::Placed)
    }

    async fn revert_placement(
        &self,
        meeting_id: &str,
        server_id: &str,
        increment: i64,
    ) -> Result<bool, LbError> {
        let mut inner = self.lock()?;

        let owned = inner
            .meetings
            .get(meeting_id)
            .is_some_and(|m| m.server_id == server_id);
        if !owned {
            return Ok(false);
        }

        inner.meetings.remove(meeting_id);
        if let Some(server) = inner.servers.get_mut(server_id) {
            server.load -= increment;
        }
        Ok(true)
    }

    async fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>, LbError> {
        Ok(self.lock()?.meetings.get(meeting_id).cloned())
    }

    async fn delete_meeting(&self, meeting_id: &str) -> Result<bool, LbError> {
        Ok(self.lock()?.meetings.remove(meeting_id).is_some())
    }

    async fn get_callback_attributes(
        &self,
        meeting_id: &str,
    ) -> Result<Option<CallbackAttributes>, LbError> {
        Ok(self.lock()?.callbacks.get(meeting_id).cloned())
    }

    async fn merge_callback_attributes(
        &self,
        meeting_id: &str,
        attributes: &CallbackAttributes,
    ) -> Result<(), LbError> {
        if attributes.is_empty() {
            return Ok(());
        }
        self.lock()?
            .callbacks
            .entry(meeting_id.to_string())
            .or_default()
            .merge(attributes.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<(), LbError> {
        self.lock().map(|_| ())
    }
}
