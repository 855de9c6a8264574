//! Redis-backed registry store.
//!
//! # Key Patterns
//!
//! - `lb:servers` - Set of server ids
//! - `lb:server:{id}` - Server record (HASH: url, secret, load, load_multiplier, state, online)
//! - `lb:meeting:{id}` - Meeting record (HASH: server_id, moderator_pw, created_at)
//! - `lb:callback:{id}` - Callback attributes (HASH)
//!
//! # Connection Pattern
//!
//! The multiplexed connection is cheap to clone and safe for concurrent use,
//! so each operation clones it instead of sharing it behind a lock.

use crate::errors::LbError;
use crate::models::{CallbackAttributes, Meeting, PlacementOutcome, Server, ServerState};
use crate::repositories::{lua_scripts, RegistryStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashMap;
use tracing::{debug, error, instrument, warn};

const SERVERS_KEY: &str = "lb:servers";

fn server_key(server_id: &str) -> String {
    format!("lb:server:{server_id}")
}

fn meeting_key(meeting_id: &str) -> String {
    format!("lb:meeting:{meeting_id}")
}

fn callback_key(meeting_id: &str) -> String {
    format!("lb:callback:{meeting_id}")
}

/// Registry store backed by Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
    record_placement_script: Script,
    revert_placement_script: Script,
    set_online_script: Script,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `LbError::Store` if the URL is invalid or the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, LbError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Note: Do NOT log redis_url as it may contain credentials
            error!(target: "lb.redis.store", error = %e, "Failed to open Redis client");
            LbError::Store(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "lb.redis.store", error = %e, "Failed to connect to Redis");
                LbError::Store(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self {
            connection,
            record_placement_script: Script::new(lua_scripts::RECORD_PLACEMENT),
            revert_placement_script: Script::new(lua_scripts::REVERT_PLACEMENT),
            set_online_script: Script::new(lua_scripts::SET_ONLINE),
        })
    }
}

fn store_error(operation: &'static str) -> impl Fn(redis::RedisError) -> LbError {
    move |e| {
        warn!(target: "lb.redis.store", error = %e, operation, "Redis operation failed");
        LbError::Store(format!("{operation} failed: {e}"))
    }
}

/// Build a server from its hash. Returns `None` for incomplete records.
fn server_from_hash(server_id: &str, fields: &HashMap<String, String>) -> Option<Server> {
    let url = fields.get("url")?.clone();
    let secret = SecretString::from(fields.get("secret")?.as_str());
    let state = fields
        .get("state")
        .and_then(|s| s.parse::<ServerState>().ok())
        .unwrap_or(ServerState::Enabled);

    Some(Server {
        id: server_id.to_string(),
        url,
        secret,
        load: fields.get("load").and_then(|v| v.parse().ok()).unwrap_or(0),
        load_multiplier: fields
            .get("load_multiplier")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1.0),
        state,
        online: fields.get("online").is_some_and(|v| v == "true"),
    })
}

fn meeting_from_hash(meeting_id: &str, fields: &HashMap<String, String>) -> Option<Meeting> {
    Some(Meeting {
        id: meeting_id.to_string(),
        server_id: fields.get("server_id")?.clone(),
        moderator_pw: fields.get("moderator_pw").cloned().unwrap_or_default(),
        created_at: fields
            .get("created_at")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
    })
}

#[async_trait]
impl RegistryStore for RedisStore {
    #[instrument(skip_all)]
    async fn list_servers(&self) -> Result<Vec<Server>, LbError> {
        let mut conn = self.connection.clone();

        let mut ids: Vec<String> = conn
            .smembers(SERVERS_KEY)
            .await
            .map_err(store_error("list_servers"))?;
        ids.sort();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(server_key(id));
        }
        let rows: Vec<HashMap<String, String>> = pipe
            .query_async(&mut conn)
            .await
            .map_err(store_error("list_servers"))?;

        let servers = ids
            .iter()
            .zip(rows.iter())
            .filter_map(|(id, fields)| {
                let server = server_from_hash(id, fields);
                if server.is_none() {
                    warn!(target: "lb.redis.store", server_id = %id, "Skipping incomplete server record");
                }
                server
            })
            .collect();

        Ok(servers)
    }

    #[instrument(skip_all, fields(server_id = %server_id))]
    async fn get_server(&self, server_id: &str) -> Result<Option<Server>, LbError> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(server_key(server_id))
            .await
            .map_err(store_error("get_server"))?;

        Ok(server_from_hash(server_id, &fields))
    }

    #[instrument(skip_all, fields(server_id = %server.id))]
    async fn put_server(&self, server: &Server) -> Result<(), LbError> {
        let mut conn = self.connection.clone();
        let fields = [
            ("url", server.url.clone()),
            ("secret", server.secret.expose_secret().to_string()),
            ("load", server.load.to_string()),
            ("load_multiplier", server.load_multiplier.to_string()),
            ("state", server.state.as_str().to_string()),
            ("online", server.online.to_string()),
        ];

        let _: () = redis::pipe()
            .atomic()
            .sadd(SERVERS_KEY, &server.id)
            .ignore()
            .hset_multiple(server_key(&server.id), &fields)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(store_error("put_server"))?;

        Ok(())
    }

    #[instrument(skip_all, fields(server_id = %server_id, online))]
    async fn set_server_online(&self, server_id: &str, online: bool) -> Result<(), LbError> {
        let mut conn = self.connection.clone();
        let updated: i64 = self
            .set_online_script
            .key(server_key(server_id))
            .arg(online.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(store_error("set_server_online"))?;

        if updated == 0 {
            debug!(target: "lb.redis.store", server_id = %server_id, "Ignoring health result for unknown server");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(meeting_id = %meeting.id, server_id = %meeting.server_id))]
    async fn record_placement(
        &self,
        meeting: &Meeting,
        expected_load: i64,
        increment: i64,
    ) -> Result<PlacementOutcome, LbError> {
        let mut conn = self.connection.clone();
        let (status, owner): (i64, String) = self
            .record_placement_script
            .key(meeting_key(&meeting.id))
            .key(server_key(&meeting.server_id))
            .arg(&meeting.server_id)
            .arg(&meeting.moderator_pw)
            .arg(meeting.created_at.to_rfc3339())
            .arg(increment)
            .arg(expected_load)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error("record_placement"))?;

        match status {
            1 => Ok(PlacementOutcome::Placed),
            0 => Ok(PlacementOutcome::Existing { server_id: owner }),
            -2 => Ok(PlacementOutcome::Stale),
            _ => Err(LbError::ServerUnavailable(meeting.server_id.clone())),
        }
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id, server_id = %server_id))]
    async fn revert_placement(
        &self,
        meeting_id: &str,
        server_id: &str,
        increment: i64,
    ) -> Result<bool, LbError> {
        let mut conn = self.connection.clone();
        let reverted: i64 = self
            .revert_placement_script
            .key(meeting_key(meeting_id))
            .key(server_key(server_id))
            .arg(server_id)
            .arg(increment)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error("revert_placement"))?;

        Ok(reverted == 1)
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id))]
    async fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>, LbError> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(meeting_key(meeting_id))
            .await
            .map_err(store_error("get_meeting"))?;

        Ok(meeting_from_hash(meeting_id, &fields))
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id))]
    async fn delete_meeting(&self, meeting_id: &str) -> Result<bool, LbError> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn
            .del(meeting_key(meeting_id))
            .await
            .map_err(store_error("delete_meeting"))?;

        Ok(removed > 0)
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id))]
    async fn get_callback_attributes(
        &self,
        meeting_id: &str,
    ) -> Result<Option<CallbackAttributes>, LbError> {
        let mut conn = self.connection.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(callback_key(meeting_id))
            .await
            .map_err(store_error("get_callback_attributes"))?;

        if fields.is_empty() {
            return Ok(None);
        }

        Ok(Some(CallbackAttributes {
            recording_ready_url: fields.get("recording_ready_url").cloned(),
            analytics_callback_url: fields.get("analytics_callback_url").cloned(),
        }))
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id))]
    async fn merge_callback_attributes(
        &self,
        meeting_id: &str,
        attributes: &CallbackAttributes,
    ) -> Result<(), LbError> {
        let mut fields: Vec<(&str, &str)> = Vec::new();
        if let Some(url) = &attributes.recording_ready_url {
            fields.push(("recording_ready_url", url.as_str()));
        }
        if let Some(url) = &attributes.analytics_callback_url {
            fields.push(("analytics_callback_url", url.as_str()));
        }
        if fields.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection.clone();
        conn.hset_multiple::<_, _, _, ()>(callback_key(meeting_id), &fields)
            .await
            .map_err(store_error("merge_callback_attributes"))?;

        Ok(())
    }

    async fn ping(&self) -> Result<(), LbError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(store_error("ping"))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_key_patterns() {
        assert_eq!(server_key("bbb-1"), "lb:server:bbb-1");
        assert_eq!(meeting_key("room 1"), "lb:meeting:room 1");
        assert_eq!(callback_key("room"), "lb:callback:room");
    }

    #[test]
    fn test_server_from_hash_full_record() {
        let server = server_from_hash(
            "bbb-1",
            &fields(&[
                ("url", "https://bbb-1.example.com/bigbluebutton/api/"),
                ("secret", "s1"),
                ("load", "4"),
                ("load_multiplier", "2.5"),
                ("state", "cordoned"),
                ("online", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(server.id, "bbb-1");
        assert_eq!(server.load, 4);
        assert_eq!(server.load_multiplier, 2.5);
        assert_eq!(server.state, ServerState::Cordoned);
        assert!(server.online);
        assert_eq!(server.secret.expose_secret(), "s1");
    }

    #[test]
    fn test_server_from_hash_defaults_and_incomplete() {
        let server = server_from_hash(
            "bbb-2",
            &fields(&[("url", "https://bbb-2.example.com/"), ("secret", "s2")]),
        )
        .unwrap();
        assert_eq!(server.load, 0);
        assert_eq!(server.load_multiplier, 1.0);
        assert_eq!(server.state, ServerState::Enabled);
        assert!(!server.online);

        assert!(server_from_hash("bbb-3", &fields(&[("url", "https://x/")])).is_none());
        assert!(server_from_hash("bbb-4", &HashMap::new()).is_none());
    }

    #[test]
    fn test_meeting_from_hash() {
        let meeting = meeting_from_hash(
            "m1",
            &fields(&[
                ("server_id", "bbb-1"),
                ("moderator_pw", "mp"),
                ("created_at", "2024-05-01T10:00:00+00:00"),
            ]),
        )
        .unwrap();

        assert_eq!(meeting.server_id, "bbb-1");
        assert_eq!(meeting.moderator_pw, "mp");
        assert_eq!(meeting.created_at.to_rfc3339(), "2024-05-01T10:00:00+00:00");

        assert!(meeting_from_hash("m2", &HashMap::new()).is_none());
    }
}
