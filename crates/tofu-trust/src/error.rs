//! Error types for trust decisions and trust anchor management.

use std::fmt;

use thiserror::Error;

use crate::types::{Fingerprint, Status};

/// Result type alias for trust operations.
pub type Result<T> = std::result::Result<T, TrustError>;

/// Permission required by a store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// List rejected and approved certificates.
    Read,
    /// Approve, reject, remove and upload certificates.
    Write,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Errors that can occur while verifying chains or managing trust.
#[derive(Error, Debug)]
pub enum TrustError {
    /// Neither the platform roots nor the stored anchors trust the chain.
    ///
    /// Carries the platform (first-stage) failure.
    #[error("certificate chain is not trusted: {0}")]
    UntrustedChain(#[source] rustls::Error),

    /// Chain id or fingerprint does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// Description of the missing resource
        resource: String,
    },

    /// Caller lacks the required permission.
    #[error("not authorized: {permission} permission required")]
    Unauthorized {
        /// The permission that was checked
        permission: Permission,
    },

    /// Uploaded bytes or operator input were rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A status change was requested that the record's state forbids.
    #[error("certificate {fingerprint} is already {status}")]
    InvalidTransition {
        /// Fingerprint of the record
        fingerprint: Fingerprint,
        /// Its current status
        status: Status,
    },

    /// Backing store content is corrupt or could not be written.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Certificate bytes could not be decoded.
    #[error("certificate decode failed: {0}")]
    Decode(String),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// The trust algorithm could not be initialized.
    #[error("trust verifier initialization failed: {0}")]
    Init(String),

    /// IO error on a path.
    #[error("io error on {path}: {source}")]
    Io {
        /// Path being read or written
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrustError {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Returns true if the chain failed verification.
    #[must_use]
    pub const fn is_untrusted(&self) -> bool {
        matches!(self, Self::UntrustedChain(_))
    }

    /// Returns true if a chain id or fingerprint was not found.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the caller lacked a permission.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns true if the backing store failed.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::Io { .. } | Self::Json(_)
        )
    }

    /// Convert into the error reported to the TLS stack.
    ///
    /// A verification failure passes the first-stage error through
    /// unchanged; anything else fails the handshake with a general error.
    #[must_use]
    pub fn into_tls(self) -> rustls::Error {
        match self {
            Self::UntrustedChain(err) => err,
            other => rustls::Error::General(other.to_string()),
        }
    }
}
