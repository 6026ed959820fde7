//! A single certificate record and its trust status.

use std::fmt;

use chrono::{DateTime, Utc};
use rustls::pki_types::CertificateDer;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrustError};
use crate::fingerprint::fingerprint;

/// SHA-256 fingerprint of a certificate's DER encoding (lowercase hex).
pub type Fingerprint = String;

/// Operator decision for a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Failed verification, not trusted
    Rejected,
    /// Trusted via the anchor store
    Approved,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "rejected"),
            Self::Approved => write!(f, "approved"),
        }
    }
}

/// Why a chain failed verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// Untrusted for a reason not tied to certificate validity
    #[default]
    Unknown,
    /// Validity window has passed
    Expired,
    /// Validity window has not started
    NotYetValid,
    /// Certificate was revoked
    Revoked,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Expired => write!(f, "expired"),
            Self::NotYetValid => write!(f, "not yet valid"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

/// One certificate in a captured or uploaded chain.
///
/// `encoded`, `fingerprint` and `parent` are fixed at construction;
/// only the status (and its timestamp) changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(with = "der_base64")]
    encoded: Vec<u8>,
    fingerprint: Fingerprint,
    status: Status,
    error: FailureReason,
    #[serde(default)]
    uploaded: bool,
    timestamp: DateTime<Utc>,
    parent: Option<Fingerprint>,
}

impl Certificate {
    /// A freshly rejected record linked to its issuer's fingerprint.
    pub(crate) fn rejected(
        encoded: Vec<u8>,
        parent: Option<Fingerprint>,
        error: FailureReason,
    ) -> Self {
        let fingerprint = fingerprint(&encoded);
        Self {
            encoded,
            fingerprint,
            status: Status::Rejected,
            error,
            uploaded: false,
            timestamp: Utc::now(),
            parent,
        }
    }

    /// An operator-submitted record, approved from the start.
    pub(crate) fn uploaded(encoded: Vec<u8>) -> Self {
        let fingerprint = fingerprint(&encoded);
        Self {
            encoded,
            fingerprint,
            status: Status::Approved,
            error: FailureReason::Unknown,
            uploaded: true,
            timestamp: Utc::now(),
            parent: None,
        }
    }

    /// Raw DER bytes.
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    /// DER bytes as a `rustls` certificate.
    pub fn der(&self) -> CertificateDer<'_> {
        CertificateDer::from(self.encoded.as_slice())
    }

    /// Hex SHA-256 of the DER bytes.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub const fn status(&self) -> Status {
        self.status
    }

    pub const fn error(&self) -> FailureReason {
        self.error
    }

    /// Whether the record came from a direct upload.
    pub const fn is_uploaded(&self) -> bool {
        self.uploaded
    }

    /// Time of the last status change.
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Fingerprint of the issuing certificate, `None` for the chain's last record.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub(crate) fn approve(&mut self) -> Result<()> {
        self.transition(Status::Rejected, Status::Approved)
    }

    pub(crate) fn reject(&mut self) -> Result<()> {
        self.transition(Status::Approved, Status::Rejected)
    }

    fn transition(&mut self, from: Status, to: Status) -> Result<()> {
        if self.status != from {
            return Err(TrustError::InvalidTransition {
                fingerprint: self.fingerprint.clone(),
                status: self.status,
            });
        }
        self.status = to;
        self.timestamp = Utc::now();
        Ok(())
    }
}

/// Standard base64 for DER bytes inside JSON.
mod der_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
