//! Meeting registry: which server hosts which meeting.

use crate::errors::LbError;
use crate::models::{Meeting, PlacementOutcome, Server};
use crate::repositories::RegistryStore;
use crate::services::server_pool::ServerPool;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Clone)]
pub struct MeetingRegistry {
    store: Arc<dyn RegistryStore>,
    pool: ServerPool,
}

impl MeetingRegistry {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self {
            pool: ServerPool::new(Arc::clone(&store)),
            store,
        }
    }

    /// The meeting, or `MeetingNotFound`.
    pub async fn lookup(&self, meeting_id: &str) -> Result<Meeting, LbError> {
        self.find(meeting_id).await?.ok_or(LbError::MeetingNotFound)
    }

    pub async fn find(&self, meeting_id: &str) -> Result<Option<Meeting>, LbError> {
        self.store.get_meeting(meeting_id).await
    }

    /// Register `meeting_id` on `server`.
    ///
    /// The mapping and the server's load increase are written together. If
    /// the meeting already exists, nothing changes and the outcome names its
    /// current server.
    #[instrument(skip_all, fields(meeting_id = %meeting_id, server_id = %server.id))]
    pub async fn create(
        &self,
        meeting_id: &str,
        server: &Server,
        moderator_pw: &str,
    ) -> Result<(Meeting, PlacementOutcome), LbError> {
        let meeting = Meeting {
            id: meeting_id.to_string(),
            server_id: server.id.clone(),
            moderator_pw: moderator_pw.to_string(),
            created_at: Utc::now(),
        };
        let outcome = self.pool.record_placement(server, &meeting).await?;
        debug!(target: "lb.service.registry", ?outcome, "Recorded placement");
        Ok((meeting, outcome))
    }

    /// Remove a meeting. Succeeds whether or not it existed.
    #[instrument(skip_all, fields(meeting_id = %meeting_id))]
    pub async fn delete(&self, meeting_id: &str) -> Result<(), LbError> {
        let existed = self.store.delete_meeting(meeting_id).await?;
        debug!(target: "lb.service.registry", existed, "Deleted meeting");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::ServerState;
    use crate::repositories::InMemoryStore;
    use common::secret::SecretString;

    fn server(id: &str) -> Server {
        Server {
            id: id.to_string(),
            url: format!("https://{id}.example.com/bigbluebutton/api/"),
            secret: SecretString::from("secret"),
            load: 0,
            load_multiplier: 1.0,
            state: ServerState::Enabled,
            online: true,
        }
    }

    #[tokio::test]
    async fn test_lookup_missing_meeting() {
        let registry = MeetingRegistry::new(Arc::new(InMemoryStore::new()));
        assert!(matches!(
            registry.lookup("nope").await,
            Err(LbError::MeetingNotFound)
        ));
    }

    #[tokio::test]
    async fn test_create_lookup_delete() {
        let a = server("a");
        let registry = MeetingRegistry::new(Arc::new(InMemoryStore::with_servers([a.clone()])));

        let (meeting, outcome) = registry.create("m1", &a, "mp").await.unwrap();
        assert_eq!(outcome, PlacementOutcome::Placed);

        let found = registry.lookup("m1").await.unwrap();
        assert_eq!(found, meeting);
        assert_eq!(found.server_id, "a");
        assert_eq!(found.moderator_pw, "mp");

        registry.delete("m1").await.unwrap();
        registry.delete("m1").await.unwrap();
        assert!(registry.find("m1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_existing_meeting_keeps_owner() {
        let (a, b) = (server("a"), server("b"));
        let registry =
            MeetingRegistry::new(Arc::new(InMemoryStore::with_servers([a.clone(), b.clone()])));

        registry.create("m1", &a, "mp").await.unwrap();
        let (_, outcome) = registry.create("m1", &b, "other").await.unwrap();

        assert_eq!(
            outcome,
            PlacementOutcome::Existing {
                server_id: "a".to_string()
            }
        );
        assert_eq!(registry.lookup("m1").await.unwrap().moderator_pw, "mp");
    }
}
