//! Certificate chains as linked records, leaf first.

use serde::{Deserialize, Serialize};

use super::certificate::{Certificate, FailureReason};
use crate::error::{Result, TrustError};
use crate::fingerprint::fingerprint;

/// An ordered, non-empty chain of certificate records.
///
/// Record `i` names record `i + 1` as its `parent`; the last record has
/// no parent. The chain is addressed by the fingerprint of its first
/// record (its id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Certificate>", into = "Vec<Certificate>")]
pub struct CertificateChain {
    certificates: Vec<Certificate>,
}

impl CertificateChain {
    /// Build a rejected chain from certificates offered in a handshake.
    ///
    /// All records share `error`; each links to the next one offered.
    pub fn capture<C: AsRef<[u8]>>(ders: &[C], error: FailureReason) -> Result<Self> {
        if ders.is_empty() {
            return Err(TrustError::InvalidInput(
                "cannot capture an empty certificate chain".into(),
            ));
        }

        let mut certificates = Vec::with_capacity(ders.len());
        let mut parent = None;
        for der in ders.iter().rev() {
            let der = der.as_ref();
            let fp = fingerprint(der);
            certificates.push(Certificate::rejected(der.to_vec(), parent.take(), error));
            parent = Some(fp);
        }
        certificates.reverse();

        Ok(Self { certificates })
    }

    /// A single-record chain for a directly uploaded certificate.
    pub(crate) fn uploaded(der: Vec<u8>) -> Self {
        Self {
            certificates: vec![Certificate::uploaded(der)],
        }
    }

    /// Fingerprint of the first (outermost) record.
    pub fn id(&self) -> &str {
        self.head().fingerprint()
    }

    /// The first record, usually the end-entity certificate.
    pub fn head(&self) -> &Certificate {
        &self.certificates[0]
    }

    pub(crate) fn head_mut(&mut self) -> &mut Certificate {
        &mut self.certificates[0]
    }

    /// Walk the chain from head to its last issuer.
    pub fn iter(&self) -> std::slice::Iter<'_, Certificate> {
        self.certificates.iter()
    }

    /// Issuers of the head, nearest first.
    pub fn issuers(&self) -> &[Certificate] {
        &self.certificates[1..]
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Always false; chains hold at least one record.
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// Fingerprints from head to last issuer.
    pub fn fingerprints(&self) -> Vec<&str> {
        self.iter().map(Certificate::fingerprint).collect()
    }

    /// Find a record by fingerprint, walking from the head.
    pub fn find(&self, fingerprint: &str) -> Option<&Certificate> {
        self.iter().find(|c| c.fingerprint() == fingerprint)
    }

    /// The sub-chain that starts at `fingerprint`.
    pub(crate) fn suffix_from(&self, fingerprint: &str) -> Option<Self> {
        let start = self
            .certificates
            .iter()
            .position(|c| c.fingerprint() == fingerprint)?;
        Some(Self {
            certificates: self.certificates[start..].to_vec(),
        })
    }
}

impl<'a> IntoIterator for &'a CertificateChain {
    type Item = &'a Certificate;
    type IntoIter = std::slice::Iter<'a, Certificate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl TryFrom<Vec<Certificate>> for CertificateChain {
    type Error = TrustError;

    fn try_from(certificates: Vec<Certificate>) -> Result<Self> {
        let Some(last) = certificates.last() else {
            return Err(TrustError::Persistence("stored chain is empty".into()));
        };
        if let Some(parent) = last.parent() {
            return Err(TrustError::Persistence(format!(
                "stored chain ends at {} which names missing issuer {parent}",
                last.fingerprint()
            )));
        }
        for pair in certificates.windows(2) {
            if pair[0].parent() != Some(pair[1].fingerprint()) {
                return Err(TrustError::Persistence(format!(
                    "stored chain link broken after {}",
                    pair[0].fingerprint()
                )));
            }
        }
        Ok(Self { certificates })
    }
}

impl From<CertificateChain> for Vec<Certificate> {
    fn from(chain: CertificateChain) -> Self {
        chain.certificates
    }
}
