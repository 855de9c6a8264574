//! Forwarding of backend analytics payloads to caller callback URLs.

use crate::errors::LbError;
use crate::repositories::RegistryStore;
use crate::services::backend_client::BackendClient;
use crate::services::callback_registry::CallbackRegistry;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What happened to an analytics payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Delivered; the receiver answered with this status.
    Delivered(u16),
    /// The meeting has no analytics callback URL on record.
    NoCallback,
    /// The receiver could not be reached.
    Failed,
}

#[derive(Clone)]
pub struct AnalyticsForwarder {
    callbacks: CallbackRegistry,
    backend: BackendClient,
}

impl AnalyticsForwarder {
    pub fn new(store: Arc<dyn RegistryStore>, backend: BackendClient) -> Self {
        Self {
            callbacks: CallbackRegistry::new(store),
            backend,
        }
    }

    /// POST `body` to the analytics callback URL stored for `meeting_id`.
    ///
    /// Delivery failures are logged and reported in the outcome; they never
    /// fail the inbound callback.
    #[instrument(skip_all, fields(meeting_id = %meeting_id))]
    pub async fn forward(
        &self,
        meeting_id: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<ForwardOutcome, LbError> {
        let Some(url) = self
            .callbacks
            .lookup(meeting_id)
            .await?
            .and_then(|attributes| attributes.analytics_callback_url)
        else {
            debug!(target: "lb.service.analytics", "No analytics callback registered");
            return Ok(ForwardOutcome::NoCallback);
        };

        match self.backend.post_callback(&url, content_type, body).await {
            Ok(status) => {
                info!(target: "lb.service.analytics", status, "Analytics payload forwarded");
                Ok(ForwardOutcome::Delivered(status))
            }
            Err(e) => {
                warn!(target: "lb.service.analytics", error = %e, "Analytics callback delivery failed");
                Ok(ForwardOutcome::Failed)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::CallbackAttributes;
    use crate::repositories::InMemoryStore;
    use std::collections::HashMap;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend() -> BackendClient {
        let vars = HashMap::from([
            ("LB_STORE".to_string(), "memory".to_string()),
            ("LOADBALANCER_SECRET".to_string(), "primary".to_string()),
        ]);
        BackendClient::new(&Config::from_vars(&vars).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_forward_posts_to_stored_url() {
        let receiver = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analytics"))
            .and(header("content-type", "application/json"))
            .and(body_string(r#"{"meeting_id":"m1"}"#))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&receiver)
            .await;

        let store = InMemoryStore::new();
        store
            .merge_callback_attributes(
                "m1",
                &CallbackAttributes {
                    recording_ready_url: None,
                    analytics_callback_url: Some(format!("{}/analytics", receiver.uri())),
                },
            )
            .await
            .unwrap();

        let forwarder = AnalyticsForwarder::new(Arc::new(store), backend());
        let outcome = forwarder
            .forward("m1", "application/json", br#"{"meeting_id":"m1"}"#.to_vec())
            .await
            .unwrap();
        assert_eq!(outcome, ForwardOutcome::Delivered(202));
    }

    #[tokio::test]
    async fn test_forward_without_callback() {
        let forwarder = AnalyticsForwarder::new(Arc::new(InMemoryStore::new()), backend());
        let outcome = forwarder
            .forward("m1", "application/json", Vec::new())
            .await
            .unwrap();
        assert_eq!(outcome, ForwardOutcome::NoCallback);
    }

    #[tokio::test]
    async fn test_forward_unreachable_receiver() {
        let store = InMemoryStore::new();
        store
            .merge_callback_attributes(
                "m1",
                &CallbackAttributes {
                    recording_ready_url: None,
                    analytics_callback_url: Some("http://127.0.0.1:1/analytics".to_string()),
                },
            )
            .await
            .unwrap();

        let forwarder = AnalyticsForwarder::new(Arc::new(store), backend());
        let outcome = forwarder
            .forward("m1", "application/json", Vec::new())
            .await
            .unwrap();
        assert_eq!(outcome, ForwardOutcome::Failed);
    }
}
