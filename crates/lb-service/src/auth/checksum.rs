//! Shared-secret request checksums.
//!
//! A checksum is the lowercase hex digest of `action ++ query ++ secret`,
//! where `query` is the raw parameter string with the `checksum` parameter
//! removed. Inbound calls may be signed with any configured secret and any
//! supported digest; the digest is identified by the checksum's length.
//! Outbound calls to backends are signed with the server's own secret.

use common::secret::{ExposeSecret, SecretString};
use ring::digest;
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Name of the query parameter carrying the checksum.
pub const CHECKSUM_PARAM: &str = "checksum";

/// Digest algorithms accepted for checksums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl ChecksumAlgorithm {
    /// Identify the algorithm that produces hex checksums of `len` characters.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(ChecksumAlgorithm::Sha1),
            64 => Some(ChecksumAlgorithm::Sha256),
            96 => Some(ChecksumAlgorithm::Sha384),
            128 => Some(ChecksumAlgorithm::Sha512),
            _ => None,
        }
    }

    fn digest_algorithm(self) -> &'static digest::Algorithm {
        match self {
            ChecksumAlgorithm::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            ChecksumAlgorithm::Sha256 => &digest::SHA256,
            ChecksumAlgorithm::Sha384 => &digest::SHA384,
            ChecksumAlgorithm::Sha512 => &digest::SHA512,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha384 => "sha384",
            ChecksumAlgorithm::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha1" => Ok(ChecksumAlgorithm::Sha1),
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "sha384" => Ok(ChecksumAlgorithm::Sha384),
            "sha512" => Ok(ChecksumAlgorithm::Sha512),
            _ => Err(ChecksumError::UnsupportedAlgorithm),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChecksumError {
    #[error("checksum parameter missing")]
    Missing,

    #[error("checksum has an unsupported length")]
    UnsupportedAlgorithm,

    #[error("checksum does not match any configured secret")]
    Mismatch,
}

/// Compute the hex checksum of `action ++ query ++ secret`.
pub fn compute(algorithm: ChecksumAlgorithm, action: &str, query: &str, secret: &str) -> String {
    let mut ctx = digest::Context::new(algorithm.digest_algorithm());
    ctx.update(action.as_bytes());
    ctx.update(query.as_bytes());
    ctx.update(secret.as_bytes());
    hex::encode(ctx.finish().as_ref())
}

/// Verify a supplied checksum against every candidate secret.
///
/// Returns the matching algorithm. The comparison is case-sensitive and
/// constant-time per candidate.
pub fn verify(
    action: &str,
    query: &str,
    supplied: &str,
    secrets: &[SecretString],
) -> Result<ChecksumAlgorithm, ChecksumError> {
    if supplied.is_empty() {
        return Err(ChecksumError::Missing);
    }

    let algorithm =
        ChecksumAlgorithm::from_hex_len(supplied.len()).ok_or(ChecksumError::UnsupportedAlgorithm)?;

    let matched = secrets.iter().any(|secret| {
        let expected = compute(algorithm, action, query, secret.expose_secret());
        bool::from(expected.as_bytes().ct_eq(supplied.as_bytes()))
    });

    if matched {
        Ok(algorithm)
    } else {
        Err(ChecksumError::Mismatch)
    }
}

/// Split a raw query string into the string that was signed and the supplied checksum.
///
/// Every `checksum=` pair is removed; the remaining pairs keep their original
/// encoding and order.
pub fn split_checksum(raw_query: &str) -> (String, Option<String>) {
    let mut supplied = None;
    let mut kept: Vec<&str> = Vec::new();

    for pair in raw_query.split('&') {
        match pair.strip_prefix("checksum=") {
            Some(value) => {
                if supplied.is_none() {
                    supplied = Some(value.to_string());
                }
            }
            None if pair == CHECKSUM_PARAM => {}
            None => kept.push(pair),
        }
    }

    (kept.join("&"), supplied)
}
