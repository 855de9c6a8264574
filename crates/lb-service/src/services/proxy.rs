//! Proxy engine for meeting actions.
//!
//! # Per-meeting calls
//!
//! `getMeetingInfo`, `isMeetingRunning` and `end` resolve the owning server
//! through the meeting registry and issue exactly one backend call. Unknown
//! meetings never reach a backend.
//!
//! # Pool-wide calls
//!
//! `getMeetings` queries every readable server concurrently and fails the
//! whole call on the first backend failure; partial results are discarded.
//!
//! # Placement
//!
//! `create` selects a server and records the placement while holding the
//! placement lock, so concurrent creates in this process always see each
//! other's load increase. Across gateway instances the store only records a
//! placement if the server's load is still the one selected; otherwise the
//! selection is repeated. The backend call happens after the lock is released; if it
//! fails the placement is reverted.
//!
//! # Cancellation
//!
//! `end` removes the registry entry before contacting the backend, and the
//! tail of `create` runs on its own task. Neither leaves state behind when
//! the request future is dropped.

use crate::config::Config;
use crate::errors::{
    LbError, UNABLE_TO_ACCESS_MEETING, UNABLE_TO_ACCESS_SERVER, UNABLE_TO_CREATE_MEETING,
};
use crate::models::{Meeting, PlacementOutcome, RequestParams, Server};
use crate::observability::metrics;
use crate::repositories::RegistryStore;
use crate::services::backend_client::{signed_url, BackendClient, BackendReply};
use crate::services::callback_registry::CallbackRegistry;
use crate::services::meeting_registry::MeetingRegistry;
use crate::services::param_pipeline::{
    self, generate_moderator_pw, RewriteAction, MODERATOR_PW_PARAM,
};
use crate::services::server_pool::ServerPool;
use crate::xml::{inner_xml, ApiResponse, XmlNode};
use futures::future::try_join_all;
use ring::rand::SystemRandom;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn, Instrument};

pub const MEETING_ID_PARAM: &str = "meetingID";

/// Selections tried before a create gives up under contention.
const MAX_PLACEMENT_ATTEMPTS: usize = 5;

/// Outcome of a proxied call that produced a protocol document.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyReply {
    /// Backend XML forwarded unchanged.
    Passthrough(String),
    /// Document built by the gateway.
    Generated(ApiResponse),
}

/// Server chosen for a create call.
struct Placement {
    server: Server,
    /// Set when this call raised the server's load and must revert on failure.
    placed: bool,
    moderator_pw: String,
}

#[derive(Clone)]
pub struct ProxyService {
    config: Arc<Config>,
    pool: ServerPool,
    meetings: MeetingRegistry,
    callbacks: CallbackRegistry,
    backend: BackendClient,
    placement_lock: Arc<Mutex<()>>,
    rng: SystemRandom,
}

impl ProxyService {
    pub fn new(config: Arc<Config>, store: Arc<dyn RegistryStore>, backend: BackendClient) -> Self {
        Self {
            config,
            pool: ServerPool::new(Arc::clone(&store)),
            meetings: MeetingRegistry::new(Arc::clone(&store)),
            callbacks: CallbackRegistry::new(store),
            backend,
            placement_lock: Arc::new(Mutex::new(())),
            rng: SystemRandom::new(),
        }
    }

    // ------------------------------------------------------------------------
    // create
    // ------------------------------------------------------------------------

    /// Create a meeting, placing it first if it is not already hosted.
    ///
    /// Placement, the backend call and any revert run on a spawned task, so
    /// a dropped request cannot leave a reservation behind.
    #[instrument(skip_all, fields(meeting_id))]
    pub async fn create(&self, inbound: &RequestParams) -> Result<ProxyReply, LbError> {
        let meeting_id = required_meeting_id(inbound)?;
        tracing::Span::current().record("meeting_id", meeting_id);

        let this = self.clone();
        let inbound = inbound.clone();
        tokio::spawn(async move { this.create_detached(&inbound).await }.in_current_span())
            .await
            .map_err(|e| {
                error!(target: "lb.service.proxy", error = %e, "Create task failed");
                LbError::Internal(UNABLE_TO_CREATE_MEETING)
            })?
    }

    async fn create_detached(&self, inbound: &RequestParams) -> Result<ProxyReply, LbError> {
        let meeting_id = required_meeting_id(inbound)?;

        let rewritten =
            param_pipeline::rewrite(RewriteAction::Create, inbound, &self.config, &self.rng)?;
        let mut params = rewritten.params;

        let placement = self
            .place(meeting_id, params.get_non_empty(MODERATOR_PW_PARAM))
            .await?;
        params.set(MODERATOR_PW_PARAM, placement.moderator_pw.clone());

        let reply = match self.backend.call(&placement.server, "create", &params).await {
            Ok(reply) => reply,
            Err(_) => {
                self.revert(&placement, meeting_id).await;
                return Err(LbError::Internal(UNABLE_TO_CREATE_MEETING));
            }
        };

        if !reply.envelope.is_success() {
            self.revert(&placement, meeting_id).await;
            return Ok(ProxyReply::Passthrough(reply.body));
        }

        self.callbacks
            .capture(meeting_id, &rewritten.callbacks)
            .await?;

        info!(
            target: "lb.service.proxy",
            meeting_id = %meeting_id,
            server_id = %placement.server.id,
            placed = placement.placed,
            "Meeting created"
        );
        Ok(ProxyReply::Passthrough(reply.body))
    }

    /// Find the meeting's current server or place it on the least-loaded one.
    async fn place(
        &self,
        meeting_id: &str,
        caller_pw: Option<&str>,
    ) -> Result<Placement, LbError> {
        let _guard = self.placement_lock.lock().await;

        if let Some(existing) = self.meetings.find(meeting_id).await? {
            match self.pool.get(&existing.server_id).await? {
                Some(server) if server.is_readable() => {
                    metrics::record_placement("existing");
                    return Ok(Placement {
                        server,
                        placed: false,
                        moderator_pw: caller_pw
                            .map_or_else(|| existing.moderator_pw.clone(), str::to_string),
                    });
                }
                _ => {
                    warn!(
                        target: "lb.service.proxy",
                        meeting_id = %meeting_id,
                        server_id = %existing.server_id,
                        "Dropping meeting on unavailable server"
                    );
                    metrics::record_placement("replaced");
                    self.meetings.delete(meeting_id).await?;
                }
            }
        }

        let moderator_pw = match caller_pw {
            Some(pw) => pw.to_string(),
            None => generate_moderator_pw(&self.rng)?,
        };

        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            let server = match self.pool.select_for_placement().await {
                Ok(server) => server,
                Err(e) => {
                    metrics::record_placement("no_capacity");
                    return Err(e);
                }
            };

            let (_, outcome) = self
                .meetings
                .create(meeting_id, &server, &moderator_pw)
                .await?;

            match outcome {
                PlacementOutcome::Placed => {
                    metrics::record_placement("placed");
                    return Ok(Placement {
                        server,
                        placed: true,
                        moderator_pw,
                    });
                }
                // Another gateway instance placed it between our lookup and write.
                PlacementOutcome::Existing { server_id } => {
                    metrics::record_placement("existing");
                    let owner = self
                        .pool
                        .get(&server_id)
                        .await?
                        .ok_or_else(|| LbError::ServerUnavailable(server_id.clone()))?;
                    let moderator_pw = match caller_pw {
                        Some(pw) => pw.to_string(),
                        None => self.meetings.lookup(meeting_id).await?.moderator_pw,
                    };
                    return Ok(Placement {
                        server: owner,
                        placed: false,
                        moderator_pw,
                    });
                }
                // Another gateway instance placed onto the same server first.
                PlacementOutcome::Stale => {
                    metrics::record_placement("stale");
                    debug!(target: "lb.service.proxy", meeting_id = %meeting_id, server_id = %server.id, "Selection outdated, selecting again");
                }
            }
        }

        warn!(target: "lb.service.proxy", meeting_id = %meeting_id, "Placement kept losing to concurrent placements");
        metrics::record_placement("contended");
        Err(LbError::Capacity)
    }

    async fn revert(&self, placement: &Placement, meeting_id: &str) {
        if !placement.placed {
            return;
        }
        match self.pool.revert_placement(&placement.server, meeting_id).await {
            Ok(_) => metrics::record_placement("reverted"),
            Err(e) => {
                warn!(target: "lb.service.proxy", meeting_id = %meeting_id, error = %e, "Failed to revert placement");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Per-meeting calls
    // ------------------------------------------------------------------------

    #[instrument(skip_all, fields(meeting_id))]
    pub async fn get_meeting_info(&self, inbound: &RequestParams) -> Result<ProxyReply, LbError> {
        let meeting_id = required_meeting_id(inbound)?;
        tracing::Span::current().record("meeting_id", meeting_id);

        let meeting = self.meetings.lookup(meeting_id).await?;
        let server = self.owning_server(&meeting).await?;
        let reply = self
            .call_for_meeting(&server, "getMeetingInfo", inbound)
            .await?;
        Ok(ProxyReply::Passthrough(reply.body))
    }

    /// Unknown meetings are reported as not running.
    #[instrument(skip_all, fields(meeting_id))]
    pub async fn is_meeting_running(&self, inbound: &RequestParams) -> Result<ProxyReply, LbError> {
        let meeting_id = required_meeting_id(inbound)?;
        tracing::Span::current().record("meeting_id", meeting_id);

        let Some(meeting) = self.meetings.find(meeting_id).await? else {
            return Ok(ProxyReply::Generated(ApiResponse::success(vec![
                XmlNode::text("running", "false"),
            ])));
        };

        let server = self.owning_server(&meeting).await?;
        let reply = self
            .call_for_meeting(&server, "isMeetingRunning", inbound)
            .await?;
        Ok(ProxyReply::Passthrough(reply.body))
    }

    /// End a meeting. The registry entry is removed whatever the backend says.
    #[instrument(skip_all, fields(meeting_id))]
    pub async fn end(&self, inbound: &RequestParams) -> Result<ProxyReply, LbError> {
        let meeting_id = required_meeting_id(inbound)?;
        tracing::Span::current().record("meeting_id", meeting_id);

        let meeting = self.meetings.lookup(meeting_id).await?;

        // Deleted before the backend call so a dropped request still ends it.
        self.meetings.delete(meeting_id).await?;
        info!(target: "lb.service.proxy", meeting_id = %meeting_id, server_id = %meeting.server_id, "Meeting ended");

        let server = self.owning_server(&meeting).await?;
        let reply = self.call_for_meeting(&server, "end", inbound).await?;
        if reply.envelope.message_key.as_deref() == Some("notFound") && !reply.envelope.is_success() {
            return Err(LbError::MeetingNotFound);
        }
        Ok(ProxyReply::Passthrough(reply.body))
    }

    async fn owning_server(&self, meeting: &Meeting) -> Result<Server, LbError> {
        self.pool
            .get(&meeting.server_id)
            .await?
            .ok_or_else(|| LbError::ServerUnavailable(meeting.server_id.clone()))
    }

    async fn call_for_meeting(
        &self,
        server: &Server,
        action: &str,
        params: &RequestParams,
    ) -> Result<BackendReply, LbError> {
        self.backend
            .call(server, action, params)
            .await
            .map_err(|_| LbError::Internal(UNABLE_TO_ACCESS_MEETING))
    }

    // ------------------------------------------------------------------------
    // Pool-wide calls
    // ------------------------------------------------------------------------

    #[instrument(skip_all)]
    pub async fn get_meetings(&self) -> Result<ProxyReply, LbError> {
        if self.config.get_meetings_api_disabled {
            metrics::record_fanout("disabled");
            return Ok(ProxyReply::Generated(no_meetings()));
        }

        let servers = self.pool.list_eligible_for_read().await?;
        let params = RequestParams::new();

        let calls = servers.iter().map(|server| {
            let params = &params;
            async move {
                let reply = self
                    .backend
                    .call(server, "getMeetings", params)
                    .await
                    .map_err(|_| LbError::Internal(UNABLE_TO_ACCESS_SERVER))?;
                if !reply.envelope.is_success() {
                    warn!(target: "lb.service.proxy", server_id = %server.id, "getMeetings refused by backend");
                    return Err(LbError::Internal(UNABLE_TO_ACCESS_SERVER));
                }
                inner_xml(&reply.body, "meetings")
                    .map(Option::unwrap_or_default)
                    .map_err(|_| LbError::Internal(UNABLE_TO_ACCESS_SERVER))
            }
        });

        let fragments = match try_join_all(calls).await {
            Ok(fragments) => fragments,
            Err(e) => {
                metrics::record_fanout("error");
                return Err(e);
            }
        };
        metrics::record_fanout("success");

        let meetings: String = fragments.concat();
        if meetings.trim().is_empty() {
            return Ok(ProxyReply::Generated(no_meetings()));
        }

        Ok(ProxyReply::Generated(ApiResponse::success(vec![
            XmlNode::raw("meetings", meetings),
        ])))
    }

    // ------------------------------------------------------------------------
    // join
    // ------------------------------------------------------------------------

    /// Signed backend join URL for the caller to be redirected to.
    #[instrument(skip_all, fields(meeting_id))]
    pub async fn join_url(&self, inbound: &RequestParams) -> Result<String, LbError> {
        let meeting_id = required_meeting_id(inbound)?;
        tracing::Span::current().record("meeting_id", meeting_id);

        let meeting = self.meetings.lookup(meeting_id).await?;
        let server = self
            .pool
            .get(&meeting.server_id)
            .await?
            .filter(Server::is_readable)
            .ok_or_else(|| LbError::ServerUnavailable(meeting.server_id.clone()))?;

        let rewritten =
            param_pipeline::rewrite(RewriteAction::Join, inbound, &self.config, &self.rng)?;

        Ok(signed_url(
            &server,
            "join",
            &rewritten.params,
            self.backend.algorithm(),
        ))
    }
}

fn required_meeting_id(params: &RequestParams) -> Result<&str, LbError> {
    params
        .get_non_empty(MEETING_ID_PARAM)
        .ok_or(LbError::MissingMeetingId)
}

fn no_meetings() -> ApiResponse {
    ApiResponse::success(vec![
        XmlNode::raw("meetings", ""),
        XmlNode::text("messageKey", "noMeetings"),
        XmlNode::text("message", "no meetings were found on this server"),
    ])
}
