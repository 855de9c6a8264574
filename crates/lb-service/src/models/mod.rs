//! Data models for the gateway.
//!
//! Servers, meetings and callback attributes live in the registry store;
//! `RequestParams` is the ordered parameter list that flows from the
//! checksum middleware through the parameter pipeline to backend calls.

use chrono::{DateTime, Utc};
use common::secret::SecretString;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Servers
// ============================================================================

/// Administrative state of a backend server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    /// Accepts new meetings and answers reads.
    Enabled,
    /// Keeps serving its existing meetings but receives no new ones.
    Cordoned,
    /// Out of rotation entirely.
    Disabled,
}

impl ServerState {
    pub fn as_str(self) -> &'static str {
        match self {
            ServerState::Enabled => "enabled",
            ServerState::Cordoned => "cordoned",
            ServerState::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(ServerState::Enabled),
            "cordoned" => Ok(ServerState::Cordoned),
            "disabled" => Ok(ServerState::Disabled),
            other => Err(format!("unknown server state '{}'", other)),
        }
    }
}

/// A backend conferencing server.
///
/// `load` is owned by the gateway: it only changes through placements and
/// their reversal, never from backend reports.
#[derive(Debug, Clone)]
pub struct Server {
    /// Stable identifier, also the tie-break order for placement.
    pub id: String,
    /// API base URL, ending in `/` (e.g. `https://bbb-1.example.com/bigbluebutton/api/`).
    pub url: String,
    /// Shared secret used to sign calls to this server.
    pub secret: SecretString,
    pub load: i64,
    pub load_multiplier: f64,
    pub state: ServerState,
    /// Result of the most recent health check.
    pub online: bool,
}

impl Server {
    /// Eligible to receive a new meeting.
    pub fn is_placeable(&self) -> bool {
        self.online && self.state == ServerState::Enabled
    }

    /// Eligible for read and status fan-out.
    pub fn is_readable(&self) -> bool {
        self.online && matches!(self.state, ServerState::Enabled | ServerState::Cordoned)
    }

    /// Amount added to `load` for each meeting placed on this server.
    pub fn load_increment(&self) -> i64 {
        if self.load_multiplier.is_finite() && self.load_multiplier > 0.0 {
            self.load_multiplier.round() as i64
        } else {
            1
        }
    }
}

// ============================================================================
// Meetings and callbacks
// ============================================================================

/// A meeting placed on a backend server.
#[derive(Debug, Clone, PartialEq)]
pub struct Meeting {
    pub id: String,
    /// Owning server, by id. Servers outlive meetings independently.
    pub server_id: String,
    pub moderator_pw: String,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied callback URLs captured at create time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallbackAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_ready_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics_callback_url: Option<String>,
}

impl CallbackAttributes {
    pub fn is_empty(&self) -> bool {
        self.recording_ready_url.is_none() && self.analytics_callback_url.is_none()
    }

    /// Fields set in `other` replace the corresponding fields here.
    pub fn merge(&mut self, other: CallbackAttributes) {
        if other.recording_ready_url.is_some() {
            self.recording_ready_url = other.recording_ready_url;
        }
        if other.analytics_callback_url.is_some() {
            self.analytics_callback_url = other.analytics_callback_url;
        }
    }
}

/// Result of an atomic placement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// The meeting was recorded on the requested server and its load raised.
    Placed,
    /// The meeting already existed; nothing was changed.
    Existing { server_id: String },
    /// The server's load moved since it was selected; nothing was changed.
    Stale,
}

// ============================================================================
// Request parameters
// ============================================================================

/// Ordered request parameters.
///
/// Order is preserved because outbound checksums are computed over the
/// encoded string. Duplicate keys are kept as received; lookups return the
/// first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams(Vec<(String, String)>);

impl RequestParams {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Parse a form-encoded string. Invalid pairs are dropped.
    pub fn parse(raw: &str) -> Self {
        Self(serde_urlencoded::from_str::<Vec<(String, String)>>(raw).unwrap_or_default())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of `key` when present and not blank.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Replace the first occurrence of `key` and drop any others, or append.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter().position(|(k, _)| k == key) {
            Some(index) => {
                let mut seen = 0usize;
                self.0.retain(|(k, _)| {
                    if k == key {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
                if let Some(entry) = self.0.get_mut(index) {
                    entry.1 = value;
                }
            }
            None => self.0.push((key.to_string(), value)),
        }
    }

    /// Remove every occurrence of `key`, returning the first value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let first = self.get(key).map(str::to_string);
        self.0.retain(|(k, _)| k != key);
        first
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Form-encode the parameters in their current order.
    pub fn to_query(&self) -> String {
        serde_urlencoded::to_string(&self.0).unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// ============================================================================
// Recordings
// ============================================================================

/// One playback format of a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackFormat {
    pub format: String,
    pub url: String,
    /// Length in minutes.
    pub length: u32,
    /// Processing time in milliseconds.
    pub processing_time: u64,
}

/// A finished-meeting recording held by the recording catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub record_id: String,
    pub meeting_id: String,
    pub name: String,
    pub published: bool,
    /// `published`, `unpublished` or `deleted`.
    pub state: String,
    /// Milliseconds since the epoch.
    pub start_time: i64,
    pub end_time: i64,
    pub participants: u32,
    pub metadata: BTreeMap<String, String>,
    pub playback_formats: Vec<PlaybackFormat>,
}

/// States returned by getRecordings when the caller does not filter by state.
pub const DEFAULT_RECORDING_STATES: [&str; 2] = ["published", "unpublished"];

/// Catalog query. Empty lists do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingFilter {
    pub meeting_ids: Vec<String>,
    /// Matched as case-sensitive prefixes of the record id.
    pub record_ids: Vec<String>,
    pub states: Vec<String>,
    /// Metadata key to accepted values. A recording matches when any
    /// listed key holds one of its accepted values.
    pub meta: Vec<(String, Vec<String>)>,
}

impl RecordingFilter {
    pub fn matches(&self, recording: &Recording) -> bool {
        let states: Vec<&str> = if self.states.is_empty() {
            DEFAULT_RECORDING_STATES.to_vec()
        } else {
            self.states.iter().map(String::as_str).collect()
        };

        (self.meeting_ids.is_empty() || self.meeting_ids.contains(&recording.meeting_id))
            && (self.record_ids.is_empty()
                || self
                    .record_ids
                    .iter()
                    .any(|id| !id.is_empty() && recording.record_id.starts_with(id.as_str())))
            && (states.contains(&"any") || states.contains(&recording.state.as_str()))
            && (self.meta.is_empty()
                || self.meta.iter().any(|(key, values)| {
                    recording
                        .metadata
                        .get(key)
                        .is_some_and(|value| values.contains(value))
                }))
    }
}

// ============================================================================
// Health
// ============================================================================

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub store: String,
}
