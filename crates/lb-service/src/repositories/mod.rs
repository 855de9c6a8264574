//! Repository layer for the gateway.
//!
//! `RegistryStore` is the shared state behind the server pool, meeting
//! registry and callback registry. Every mutation on a single key is atomic;
//! `record_placement` raises a server's load and writes the meeting mapping
//! as one step.
//!
//! - `RedisStore` - shared store for multi-instance deployments
//! - `InMemoryStore` - process-local store with identical semantics
//! - `RecordingCatalog` - recording storage consumed by the recording actions

mod lua_scripts;
mod memory_store;
mod recordings;
mod redis_store;

pub use memory_store::InMemoryStore;
pub use recordings::{InMemoryRecordingCatalog, MetadataChange, RecordingCatalog};
pub use redis_store::RedisStore;

use crate::errors::LbError;
use crate::models::{CallbackAttributes, Meeting, PlacementOutcome, Server};
use async_trait::async_trait;

/// Shared registry of servers, meetings and callback attributes.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// All known servers, ordered by id.
    async fn list_servers(&self) -> Result<Vec<Server>, LbError>;

    async fn get_server(&self, server_id: &str) -> Result<Option<Server>, LbError>;

    /// Insert or replace a server record. Used by fleet tooling and tests.
    async fn put_server(&self, server: &Server) -> Result<(), LbError>;

    /// Record a health check result. Unknown servers are ignored.
    async fn set_server_online(&self, server_id: &str, online: bool) -> Result<(), LbError>;

    /// Atomically write `meeting` and add `increment` to its server's load.
    ///
    /// If the meeting already exists nothing changes and the current owner is
    /// returned. If the server's load is no longer `expected_load`, nothing
    /// changes and the outcome is `Stale`. Fails with `ServerUnavailable` if
    /// the server record is gone.
    async fn record_placement(
        &self,
        meeting: &Meeting,
        expected_load: i64,
        increment: i64,
    ) -> Result<PlacementOutcome, LbError>;

    /// Undo a placement: delete the meeting and subtract `increment`, but only
    /// while the meeting is still owned by `server_id`. Returns whether
    /// anything was undone.
    async fn revert_placement(
        &self,
        meeting_id: &str,
        server_id: &str,
        increment: i64,
    ) -> Result<bool, LbError>;

    async fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>, LbError>;

    /// Delete a meeting. Succeeds whether or not it existed; returns whether it did.
    async fn delete_meeting(&self, meeting_id: &str) -> Result<bool, LbError>;

    async fn get_callback_attributes(
        &self,
        meeting_id: &str,
    ) -> Result<Option<CallbackAttributes>, LbError>;

    /// Store the set fields of `attributes`, keeping fields it leaves unset.
    async fn merge_callback_attributes(
        &self,
        meeting_id: &str,
        attributes: &CallbackAttributes,
    ) -> Result<(), LbError>;

    /// Connectivity check for readiness checks.
    async fn ping(&self) -> Result<(), LbError>;
}
