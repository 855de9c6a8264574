//! Callback registry: caller-supplied callback URLs per meeting.

use crate::errors::LbError;
use crate::models::CallbackAttributes;
use crate::repositories::RegistryStore;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct CallbackRegistry {
    store: Arc<dyn RegistryStore>,
}

impl CallbackRegistry {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Store the URLs captured from a create call. Nothing is written when
    /// the call carried no callback URLs.
    pub async fn capture(
        &self,
        meeting_id: &str,
        attributes: &CallbackAttributes,
    ) -> Result<(), LbError> {
        if attributes.is_empty() {
            return Ok(());
        }
        self.store
            .merge_callback_attributes(meeting_id, attributes)
            .await?;
        debug!(target: "lb.service.callbacks", meeting_id = %meeting_id, "Stored callback attributes");
        Ok(())
    }

    pub async fn lookup(&self, meeting_id: &str) -> Result<Option<CallbackAttributes>, LbError> {
        self.store.get_callback_attributes(meeting_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryStore;

    #[tokio::test]
    async fn test_capture_and_lookup() {
        let registry = CallbackRegistry::new(Arc::new(InMemoryStore::new()));

        registry
            .capture("m1", &CallbackAttributes::default())
            .await
            .unwrap();
        assert!(registry.lookup("m1").await.unwrap().is_none());

        let attributes = CallbackAttributes {
            recording_ready_url: Some("https://lms.example.com/ready".to_string()),
            analytics_callback_url: None,
        };
        registry.capture("m1", &attributes).await.unwrap();
        assert_eq!(registry.lookup("m1").await.unwrap(), Some(attributes));
    }
}
