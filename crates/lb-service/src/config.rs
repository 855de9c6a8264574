//! Gateway configuration.
//!
//! Configuration is loaded from environment variables. Secrets and the
//! Redis URL are redacted in Debug output.

use crate::auth::ChecksumAlgorithm;
use common::secret::{split_secrets, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default public host used for the analytics callback URL.
pub const DEFAULT_URL_HOST: &str = "localhost";

/// Default bound on a single backend call.
pub const DEFAULT_BACKEND_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default bound on establishing a backend connection.
pub const DEFAULT_BACKEND_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Default server poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 60;

/// Which registry store backs the server pool and meeting registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Shared Redis store; required when running more than one gateway.
    Redis,
    /// Process-local store.
    Memory,
}

/// Parameter rewrite rules for one proxied action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamRules {
    /// Keys dropped from the caller's parameters.
    pub exclude: Vec<String>,
    /// Key/value pairs added when the caller did not supply the key.
    pub defaults: Vec<(String, String)>,
    /// Key/value pairs forced regardless of caller input.
    pub overrides: Vec<(String, String)>,
}

/// Gateway configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Registry store selection.
    pub store: StoreKind,

    /// Redis connection URL. Present whenever `store` is `Redis`.
    pub redis_url: Option<String>,

    /// Secrets accepted for inbound checksums. The primary secret is first.
    pub api_secrets: Vec<SecretString>,

    /// Public host name of this gateway.
    pub url_host: String,

    /// Build identifier rendered by the index call.
    pub build_number: Option<String>,

    /// Upper bound for the `duration` create parameter, in minutes.
    pub max_meeting_duration: Option<u64>,

    /// When set, getMeetings answers "no meetings" without contacting backends.
    pub get_meetings_api_disabled: bool,

    /// When set, every recording action answers "not found".
    pub recording_disabled: bool,

    /// When set, getRecordings requires a meetingID or recordID filter.
    pub get_recordings_api_filtered: bool,

    /// Rewrite rules applied to create calls.
    pub create_params: ParamRules,

    /// Rewrite rules applied to join redirects.
    pub join_params: ParamRules,

    /// Bound on a single backend call.
    pub backend_request_timeout: Duration,

    /// Bound on establishing a backend connection.
    pub backend_connect_timeout: Duration,

    /// Digest used to sign outbound backend calls.
    pub backend_checksum_algorithm: ChecksumAlgorithm,

    /// How often the server poller checks each backend.
    pub poll_interval: Duration,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("store", &self.store)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("api_secrets", &format!("[{} REDACTED]", self.api_secrets.len()))
            .field("url_host", &self.url_host)
            .field("build_number", &self.build_number)
            .field("max_meeting_duration", &self.max_meeting_duration)
            .field("get_meetings_api_disabled", &self.get_meetings_api_disabled)
            .field("recording_disabled", &self.recording_disabled)
            .field(
                "get_recordings_api_filtered",
                &self.get_recordings_api_filtered,
            )
            .field("create_params", &self.create_params)
            .field("join_params", &self.join_params)
            .field("backend_request_timeout", &self.backend_request_timeout)
            .field("backend_connect_timeout", &self.backend_connect_timeout)
            .field(
                "backend_checksum_algorithm",
                &self.backend_checksum_algorithm,
            )
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid store configuration: {0}")]
    InvalidStore(String),

    #[error("Invalid integer for {name}: {reason}")]
    InvalidInteger { name: String, reason: String },

    #[error("Invalid parameter list for {name}: {reason}")]
    InvalidParamList { name: String, reason: String },

    #[error("Invalid checksum algorithm: {0}")]
    InvalidChecksumAlgorithm(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let store = match vars.get("LB_STORE").map(|s| s.to_ascii_lowercase()) {
            None => StoreKind::Redis,
            Some(kind) if kind == "redis" => StoreKind::Redis,
            Some(kind) if kind == "memory" => StoreKind::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidStore(format!(
                    "LB_STORE must be 'redis' or 'memory', got '{}'",
                    other
                )))
            }
        };

        let redis_url = vars.get("REDIS_URL").cloned();
        if store == StoreKind::Redis && redis_url.is_none() {
            return Err(ConfigError::MissingEnvVar("REDIS_URL".to_string()));
        }

        let primary_secret = vars
            .get("LOADBALANCER_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("LOADBALANCER_SECRET".to_string()))?;

        let mut api_secrets = vec![SecretString::from(primary_secret.trim())];
        if let Some(extra) = vars.get("LOADBALANCER_SECRETS") {
            api_secrets.extend(split_secrets(extra));
        }

        let url_host = vars
            .get("URL_HOST")
            .cloned()
            .unwrap_or_else(|| DEFAULT_URL_HOST.to_string());

        let build_number = vars
            .get("BUILD_NUMBER")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        // Zero disables the clamp
        let max_meeting_duration =
            parse_u64(vars, "MAX_MEETING_DURATION")?.filter(|minutes| *minutes > 0);

        let create_params = ParamRules {
            exclude: parse_key_list(vars.get("CREATE_EXCLUDE_PARAMS")),
            defaults: parse_param_map(vars, "DEFAULT_CREATE_PARAMS")?,
            overrides: parse_param_map(vars, "OVERRIDE_CREATE_PARAMS")?,
        };

        let join_params = ParamRules {
            exclude: parse_key_list(vars.get("JOIN_EXCLUDE_PARAMS")),
            defaults: parse_param_map(vars, "DEFAULT_JOIN_PARAMS")?,
            overrides: parse_param_map(vars, "OVERRIDE_JOIN_PARAMS")?,
        };

        let backend_request_timeout = Duration::from_millis(parse_positive(
            vars,
            "BACKEND_REQUEST_TIMEOUT_MS",
            DEFAULT_BACKEND_REQUEST_TIMEOUT_MS,
        )?);

        let backend_connect_timeout = Duration::from_millis(parse_positive(
            vars,
            "BACKEND_CONNECT_TIMEOUT_MS",
            DEFAULT_BACKEND_CONNECT_TIMEOUT_MS,
        )?);

        let backend_checksum_algorithm = match vars.get("BACKEND_CHECKSUM_ALGORITHM") {
            Some(value) => value
                .parse::<ChecksumAlgorithm>()
                .map_err(|_| ConfigError::InvalidChecksumAlgorithm(value.clone()))?,
            None => ChecksumAlgorithm::Sha1,
        };

        let poll_interval = Duration::from_secs(parse_positive(
            vars,
            "POLL_INTERVAL_SECONDS",
            DEFAULT_POLL_INTERVAL_SECONDS,
        )?);

        Ok(Config {
            bind_address,
            store,
            redis_url,
            api_secrets,
            url_host,
            build_number,
            max_meeting_duration,
            get_meetings_api_disabled: parse_flag(vars, "GET_MEETINGS_API_DISABLED"),
            recording_disabled: parse_flag(vars, "RECORDING_DISABLED"),
            get_recordings_api_filtered: parse_flag(vars, "GET_RECORDINGS_API_FILTERED"),
            create_params,
            join_params,
            backend_request_timeout,
            backend_connect_timeout,
            backend_checksum_algorithm,
            poll_interval,
        })
    }
}

fn parse_flag(vars: &HashMap<String, String>, name: &str) -> bool {
    vars.get(name).is_some_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes"
        )
    })
}

fn parse_u64(vars: &HashMap<String, String>, name: &str) -> Result<Option<u64>, ConfigError> {
    vars.get(name)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidInteger {
                    name: name.to_string(),
                    reason: format!("expected a non-negative integer, got '{}': {}", value, e),
                })
        })
        .transpose()
}

fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match parse_u64(vars, name)? {
        Some(0) => Err(ConfigError::InvalidInteger {
            name: name.to_string(),
            reason: "must be greater than 0".to_string(),
        }),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

fn parse_key_list(raw: Option<&String>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Parse a form-encoded `k=v&k2=v2` list, preserving order.
fn parse_param_map(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<Vec<(String, String)>, ConfigError> {
    match vars.get(name) {
        Some(raw) => serde_urlencoded::from_str::<Vec<(String, String)>>(raw.trim()).map_err(|e| {
            ConfigError::InvalidParamList {
                name: name.to_string(),
                reason: e.to_string(),
            }
        }),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            ("REDIS_URL".to_string(), "redis://localhost:6379".to_string()),
            ("LOADBALANCER_SECRET".to_string(), "primary".to_string()),
        ])
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&base_vars()).unwrap();

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.store, StoreKind::Redis);
        assert_eq!(config.url_host, DEFAULT_URL_HOST);
        assert_eq!(config.build_number, None);
        assert_eq!(config.max_meeting_duration, None);
        assert!(!config.get_meetings_api_disabled);
        assert!(!config.recording_disabled);
        assert_eq!(config.create_params, ParamRules::default());
        assert_eq!(
            config.backend_request_timeout,
            Duration::from_millis(DEFAULT_BACKEND_REQUEST_TIMEOUT_MS)
        );
        assert_eq!(config.backend_checksum_algorithm, ChecksumAlgorithm::Sha1);
        assert_eq!(config.api_secrets.len(), 1);
    }

    #[test]
    fn test_missing_secret_is_error() {
        let mut vars = base_vars();
        vars.remove("LOADBALANCER_SECRET");

        let err = Config::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "LOADBALANCER_SECRET"));
    }

    #[test]
    fn test_redis_url_required_for_redis_store() {
        let mut vars = base_vars();
        vars.remove("REDIS_URL");

        let err = Config::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref v) if v == "REDIS_URL"));

        vars.insert("LB_STORE".to_string(), "memory".to_string());
        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.store, StoreKind::Memory);
    }

    #[test]
    fn test_unknown_store_is_error() {
        let mut vars = base_vars();
        vars.insert("LB_STORE".to_string(), "postgres".to_string());

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidStore(_))
        ));
    }

    #[test]
    fn test_rotating_secrets_follow_primary() {
        let mut vars = base_vars();
        vars.insert(
            "LOADBALANCER_SECRETS".to_string(),
            "old-1:old-2".to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();
        let exposed: Vec<&str> = config
            .api_secrets
            .iter()
            .map(|s| s.expose_secret())
            .collect();
        assert_eq!(exposed, vec!["primary", "old-1", "old-2"]);
    }

    #[test]
    fn test_param_rules_parsed_in_order() {
        let mut vars = base_vars();
        vars.insert(
            "CREATE_EXCLUDE_PARAMS".to_string(),
            "logo, record ,".to_string(),
        );
        vars.insert(
            "DEFAULT_CREATE_PARAMS".to_string(),
            "welcome=Hello+there&record=true".to_string(),
        );
        vars.insert(
            "OVERRIDE_JOIN_PARAMS".to_string(),
            "userdata-bbb_skip_check_audio=true".to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.create_params.exclude, vec!["logo", "record"]);
        assert_eq!(
            config.create_params.defaults,
            vec![
                ("welcome".to_string(), "Hello there".to_string()),
                ("record".to_string(), "true".to_string()),
            ]
        );
        assert_eq!(
            config.join_params.overrides,
            vec![(
                "userdata-bbb_skip_check_audio".to_string(),
                "true".to_string()
            )]
        );
    }

    #[test]
    fn test_flags_and_duration() {
        let mut vars = base_vars();
        vars.insert("GET_MEETINGS_API_DISABLED".to_string(), "TRUE".to_string());
        vars.insert("RECORDING_DISABLED".to_string(), "no".to_string());
        vars.insert("MAX_MEETING_DURATION".to_string(), "3600".to_string());
        vars.insert("BUILD_NUMBER".to_string(), "alpha-1".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert!(config.get_meetings_api_disabled);
        assert!(!config.recording_disabled);
        assert_eq!(config.max_meeting_duration, Some(3600));
        assert_eq!(config.build_number.as_deref(), Some("alpha-1"));
    }

    #[test]
    fn test_zero_duration_disables_clamp() {
        let mut vars = base_vars();
        vars.insert("MAX_MEETING_DURATION".to_string(), "0".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.max_meeting_duration, None);
    }

    #[test]
    fn test_invalid_timeout_is_error() {
        let mut vars = base_vars();
        vars.insert("BACKEND_REQUEST_TIMEOUT_MS".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidInteger { .. })
        ));

        vars.insert("BACKEND_REQUEST_TIMEOUT_MS".to_string(), "soon".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidInteger { .. })
        ));
    }

    #[test]
    fn test_checksum_algorithm_parsed() {
        let mut vars = base_vars();
        vars.insert("BACKEND_CHECKSUM_ALGORITHM".to_string(), "sha256".to_string());
        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.backend_checksum_algorithm, ChecksumAlgorithm::Sha256);

        vars.insert("BACKEND_CHECKSUM_ALGORITHM".to_string(), "md5".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidChecksumAlgorithm(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut vars = base_vars();
        vars.insert(
            "REDIS_URL".to_string(),
            "redis://:hunter2@localhost:6379".to_string(),
        );

        let config = Config::from_vars(&vars).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("primary"));
        assert!(debug.contains("REDACTED"));
    }
}
