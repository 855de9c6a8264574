//! Bearer token validation for the analytics callback.
//!
//! Backends sign analytics callbacks with an HMAC JWT keyed by the
//! gateway's API secret. Any configured secret is accepted so the
//! callback keeps working across secret rotation. Tokens carry no
//! mandatory claims; `exp` is enforced only when present.

use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::collections::HashSet;
use tracing::debug;

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Returns `true` if `token` verifies under any of `secrets`.
pub fn verify(token: &str, secrets: &[SecretString]) -> bool {
    let mut validation = Validation::new(Algorithm::HS512);
    validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    validation.required_spec_claims = HashSet::new();
    validation.validate_aud = false;

    secrets.iter().any(|secret| {
        let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
        match decode::<serde_json::Map<String, serde_json::Value>>(token, &key, &validation) {
            Ok(_) => true,
            Err(e) => {
                debug!(target: "lb.auth.analytics", error = %e, "Analytics token rejected by candidate secret");
                false
            }
        }
    })
}
