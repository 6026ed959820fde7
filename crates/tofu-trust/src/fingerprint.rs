//! SHA-256 certificate fingerprints via `ring::digest`.

use ring::digest::{digest, SHA256};

use crate::types::Fingerprint;

/// Compute SHA-256 of raw bytes.
///
/// Returns lowercase hex-encoded digest.
#[must_use]
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(digest(&SHA256, data).as_ref())
}

/// Fingerprint of a DER-encoded certificate.
#[must_use]
pub fn fingerprint(der: &[u8]) -> Fingerprint {
    sha256_bytes(der)
}

/// Check that a string could be a fingerprint (64 lowercase hex chars).
#[must_use]
pub fn is_fingerprint(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
