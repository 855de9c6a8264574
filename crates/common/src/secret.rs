//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use these types
//! for the gateway's API secrets, per-server shared secrets, and anything
//! else that must never appear in logs or `Debug` output.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that
//! derives `Debug` and holds one gets safe logging behavior for free.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Backend {
//!     url: String,
//!     secret: SecretString,
//! }
//!
//! let backend = Backend {
//!     url: "https://bbb-1.example.com/bigbluebutton/api/".to_string(),
//!     secret: SecretString::from("shared-secret"),
//! };
//!
//! assert!(!format!("{backend:?}").contains("shared-secret"));
//! assert_eq!(backend.secret.expose_secret(), "shared-secret");
//! ```

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Split a list of secrets separated by `:` or `,` into individual secrets.
///
/// Surrounding whitespace is trimmed and empty entries are dropped, so a
/// trailing separator or an unset variable yields no secrets.
#[must_use]
pub fn split_secrets(raw: &str) -> Vec<SecretString> {
    raw.split([':', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SecretString::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("password123");
        assert_eq!(secret.expose_secret(), "password123");
    }

    #[test]
    fn test_deserialize_server_secret() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct ServerRecord {
            url: String,
            secret: SecretString,
        }

        let json = r#"{"url": "https://bbb.example.com/", "secret": "s3cret"}"#;
        let record: ServerRecord = serde_json::from_str(json).expect("deserialize");

        assert_eq!(record.secret.expose_secret(), "s3cret");
        assert!(!format!("{record:?}").contains("s3cret"));
    }

    #[test]
    fn test_split_secrets_accepts_both_separators() {
        let secrets = split_secrets("alpha:beta,gamma");
        let exposed: Vec<&str> = secrets.iter().map(ExposeSecret::expose_secret).collect();
        assert_eq!(exposed, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_split_secrets_drops_empty_entries() {
        let secrets = split_secrets(" one ,, :two: ");
        let exposed: Vec<&str> = secrets.iter().map(ExposeSecret::expose_secret).collect();
        assert_eq!(exposed, vec!["one", "two"]);
        assert!(split_secrets("").is_empty());
    }

    #[test]
    fn test_clone_works() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
