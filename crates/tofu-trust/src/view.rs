//! Operator-facing views of stored chains, with the actions allowed on each record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::auth::PermissionChecker;
use crate::types::{
    Certificate, CertificateChain, CertificateDetails, FailureReason, Fingerprint, Status,
};

/// Something an operator may do to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Approve,
    Reject,
    Remove,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// An action bound to its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub action: Action,
    /// Id of the stored chain the record lives in
    pub chain: Fingerprint,
    /// Target record; absent for actions on the whole chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

impl Link {
    /// Arguments for the matching CLI command, e.g. `approve <chain> <fingerprint>`.
    pub fn command(&self) -> String {
        match &self.fingerprint {
            Some(fp) => format!("{} {} {fp}", self.action, self.chain),
            None => format!("{} {}", self.action, self.chain),
        }
    }
}

/// One record with its decoded fields and allowed actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateView {
    pub fingerprint: Fingerprint,
    /// `None` if the stored bytes do not decode as X.509
    pub details: Option<CertificateDetails>,
    pub status: Status,
    pub error: FailureReason,
    pub timestamp: DateTime<Utc>,
    pub uploaded: bool,
    pub parent: Option<Fingerprint>,
    pub links: Vec<Link>,
}

/// A stored chain: its head record plus the issuers above it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainView {
    pub id: Fingerprint,
    pub certificate: CertificateView,
    pub chain: Vec<CertificateView>,
}

impl ChainView {
    pub fn new(chain: &CertificateChain, permissions: &dyn PermissionChecker) -> Self {
        let manage = permissions.is_write_allowed();
        let id = chain.id();

        let certificate = view(chain.head(), links(chain.head(), id, true, manage));
        let issuers = chain
            .issuers()
            .iter()
            .map(|c| {
                let links = if chain.head().status() == Status::Rejected {
                    links(c, id, false, manage)
                } else {
                    Vec::new()
                };
                view(c, links)
            })
            .collect();

        Self {
            id: id.to_string(),
            certificate,
            chain: issuers,
        }
    }

    /// Views for a listing, in the listing's order.
    pub fn from_chains(chains: &[CertificateChain], permissions: &dyn PermissionChecker) -> Vec<Self> {
        chains.iter().map(|c| Self::new(c, permissions)).collect()
    }
}

fn view(certificate: &Certificate, links: Vec<Link>) -> CertificateView {
    let details = match CertificateDetails::decode(certificate) {
        Ok(details) => Some(details),
        Err(e) => {
            debug!(fingerprint = %certificate.fingerprint(), error = %e, "stored certificate does not decode");
            None
        }
    };

    CertificateView {
        fingerprint: certificate.fingerprint().to_string(),
        details,
        status: certificate.status(),
        error: certificate.error(),
        timestamp: certificate.timestamp(),
        uploaded: certificate.is_uploaded(),
        parent: certificate.parent().map(str::to_string),
        links,
    }
}

/// Approving a record whose failure names a validity problem is never offered.
fn links(certificate: &Certificate, chain: &str, is_head: bool, manage: bool) -> Vec<Link> {
    if !manage {
        return Vec::new();
    }

    let target = Some(certificate.fingerprint().to_string());
    let mut links = Vec::new();
    match certificate.status() {
        Status::Rejected => {
            if is_head {
                links.push(Link {
                    action: Action::Remove,
                    chain: chain.to_string(),
                    fingerprint: None,
                });
            }
            if certificate.error() == FailureReason::Unknown {
                links.push(Link {
                    action: Action::Approve,
                    chain: chain.to_string(),
                    fingerprint: target,
                });
            }
        }
        Status::Approved => links.push(Link {
            action: Action::Reject,
            chain: chain.to_string(),
            fingerprint: target,
        }),
    }
    links
}

/// Entry points offered to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexLink {
    Rejected,
    Approved,
    Upload,
}

impl fmt::Display for IndexLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected => write!(f, "rejected"),
            Self::Approved => write!(f, "approved"),
            Self::Upload => write!(f, "upload"),
        }
    }
}

/// Listings need read; upload needs write as well.
pub fn index_links(permissions: &dyn PermissionChecker) -> Vec<IndexLink> {
    if !permissions.is_read_allowed() {
        return Vec::new();
    }
    let mut links = vec![IndexLink::Rejected, IndexLink::Approved];
    if permissions.is_write_allowed() {
        links.push(IndexLink::Upload);
    }
    links
}
