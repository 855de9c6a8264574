//! Parameter rewriting for proxied calls.
//!
//! `rewrite` turns the caller's parameters into the parameters sent to the
//! backend. Steps run in a fixed order:
//!
//! 1. Exclusion of keys listed for the action
//! 2. Capture of gateway-managed callback keys (create only)
//! 3. Default fill
//! 4. Forced overrides
//! 5. Duration clamp (create only)
//! 6. Voice bridge generation (create only)
//!
//! Excluded keys stay excluded even when defaults or overrides name them.

use crate::config::{Config, ParamRules};
use crate::errors::LbError;
use crate::models::{CallbackAttributes, RequestParams};
use ring::rand::SecureRandom;

/// Caller metadata key carrying the recording-ready callback URL.
pub const RECORDING_READY_URL_PARAM: &str = "meta_bn-recording-ready-url";

/// Caller metadata key carrying the analytics callback URL.
pub const ANALYTICS_CALLBACK_URL_PARAM: &str = "meta_analytics-callback-url";

/// Path the backend is told to deliver analytics to.
pub const ANALYTICS_CALLBACK_PATH: &str = "/bigbluebutton/api/analytics_callback";

const DURATION_PARAM: &str = "duration";
const VOICE_BRIDGE_PARAM: &str = "voiceBridge";
pub const MODERATOR_PW_PARAM: &str = "moderatorPW";

const MODERATOR_PW_LEN: usize = 8;
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Action whose parameters are being rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteAction {
    Create,
    Join,
}

/// Outbound parameters plus the callback URLs captured on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewritten {
    pub params: RequestParams,
    pub callbacks: CallbackAttributes,
}

/// Rewrite `inbound` for `action`.
///
/// # Errors
///
/// Returns `LbError::Internal` if the system random source fails.
pub fn rewrite(
    action: RewriteAction,
    inbound: &RequestParams,
    config: &Config,
    rng: &dyn SecureRandom,
) -> Result<Rewritten, LbError> {
    let rules = match action {
        RewriteAction::Create => &config.create_params,
        RewriteAction::Join => &config.join_params,
    };

    let mut params = exclude(inbound, rules);
    let callbacks = match action {
        RewriteAction::Create => capture_callbacks(&mut params, &config.url_host),
        RewriteAction::Join => CallbackAttributes::default(),
    };
    fill_defaults(&mut params, rules);
    apply_overrides(&mut params, rules);

    if action == RewriteAction::Create {
        if let Some(max) = config.max_meeting_duration {
            clamp_duration(&mut params, max);
        }
        if params.get_non_empty(VOICE_BRIDGE_PARAM).is_none() {
            params.set(VOICE_BRIDGE_PARAM, generate_voice_bridge(rng)?);
        }
    }

    Ok(Rewritten { params, callbacks })
}

fn exclude(inbound: &RequestParams, rules: &ParamRules) -> RequestParams {
    inbound
        .iter()
        .filter(|(key, _)| !rules.exclude.iter().any(|excluded| excluded == key))
        .collect()
}

/// Strip the recording-ready key and point the analytics key at the gateway.
fn capture_callbacks(params: &mut RequestParams, url_host: &str) -> CallbackAttributes {
    let recording_ready_url = params
        .remove(RECORDING_READY_URL_PARAM)
        .filter(|url| !url.trim().is_empty());

    let analytics_callback_url = params
        .get_non_empty(ANALYTICS_CALLBACK_URL_PARAM)
        .map(str::to_string);
    match &analytics_callback_url {
        Some(_) => params.set(
            ANALYTICS_CALLBACK_URL_PARAM,
            format!("https://{url_host}{ANALYTICS_CALLBACK_PATH}"),
        ),
        None => {
            params.remove(ANALYTICS_CALLBACK_URL_PARAM);
        }
    }

    CallbackAttributes {
        recording_ready_url,
        analytics_callback_url,
    }
}

fn fill_defaults(params: &mut RequestParams, rules: &ParamRules) {
    for (key, value) in &rules.defaults {
        if !params.contains(key) && !rules.exclude.contains(key) {
            params.set(key, value.clone());
        }
    }
}

fn apply_overrides(params: &mut RequestParams, rules: &ParamRules) {
    for (key, value) in &rules.overrides {
        if !rules.exclude.contains(key) {
            params.set(key, value.clone());
        }
    }
}

/// Absent, zero or over-limit durations become `max`.
///
/// The value is read by its leading integer, so `"90min"` is 90 and `"abc"`
/// is zero. Negative values are left for the backend to judge.
fn clamp_duration(params: &mut RequestParams, max: u64) {
    let max_minutes = i64::try_from(max).unwrap_or(i64::MAX);
    let within_limit = match params.get(DURATION_PARAM).map(leading_integer) {
        Some(minutes) => minutes != 0 && minutes <= max_minutes,
        None => false,
    };

    if !within_limit {
        params.set(DURATION_PARAM, max.to_string());
    }
}

/// Leading optionally-signed integer of `value`; zero when there is none.
fn leading_integer(value: &str) -> i64 {
    let trimmed = value.trim_start();
    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return 0;
    }
    match (digits.parse::<i64>(), negative) {
        (Ok(n), false) => n,
        (Ok(n), true) => -n,
        (Err(_), false) => i64::MAX,
        (Err(_), true) => i64::MIN,
    }
}

/// A 9-digit number without a leading zero.
pub fn generate_voice_bridge(rng: &dyn SecureRandom) -> Result<String, LbError> {
    let mut bytes = [0u8; 8];
    rng.fill(&mut bytes)
        .map_err(|_| LbError::Internal("Random source unavailable."))?;
    let n = u64::from_le_bytes(bytes);
    Ok((100_000_000 + n % 900_000_000).to_string())
}

/// An 8-character alphanumeric moderator password.
pub fn generate_moderator_pw(rng: &dyn SecureRandom) -> Result<String, LbError> {
    let mut bytes = [0u8; MODERATOR_PW_LEN];
    rng.fill(&mut bytes)
        .map_err(|_| LbError::Internal("Random source unavailable."))?;
    Ok(bytes
        .iter()
        .filter_map(|b| ALPHANUMERIC.get(usize::from(*b) % ALPHANUMERIC.len()))
        .map(|b| char::from(*b))
        .collect())
}
