//! Human-readable fields decoded from a certificate's DER bytes.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use x509_parser::objects::{oid2sn, oid_registry};

use super::certificate::{Certificate, Fingerprint};
use crate::error::{Result, TrustError};
use crate::fingerprint::fingerprint;

/// Decoded X.509 fields shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDetails {
    /// SHA-256 fingerprint of DER bytes (hex)
    pub fingerprint: Fingerprint,
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Serial number (hex)
    pub serial: String,
    /// Not valid before
    pub not_before: DateTime<Utc>,
    /// Not valid after
    pub not_after: DateTime<Utc>,
    /// Signature algorithm name, or its OID when unnamed
    pub signature_algorithm: String,
}

impl CertificateDetails {
    /// Decode the record's certificate.
    pub fn decode(certificate: &Certificate) -> Result<Self> {
        Self::parse(certificate.fingerprint(), certificate.encoded())
    }

    /// Decode raw DER bytes, e.g. a trust anchor.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        Self::parse(&fingerprint(der), der)
    }

    fn parse(fingerprint: &str, der: &[u8]) -> Result<Self> {
        let (_, cert) =
            x509_parser::parse_x509_certificate(der).map_err(|e| TrustError::Decode(e.to_string()))?;

        let oid = &cert.signature_algorithm.algorithm;
        let signature_algorithm =
            oid2sn(oid, oid_registry()).map_or_else(|_| oid.to_id_string(), str::to_string);

        Ok(Self {
            fingerprint: fingerprint.to_string(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: cert.raw_serial_as_string(),
            not_before: asn1_to_utc(cert.validity().not_before),
            not_after: asn1_to_utc(cert.validity().not_after),
            signature_algorithm,
        })
    }

    /// Whether `now` falls inside the validity window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }
}

/// Check that bytes are exactly one X.509 certificate, with nothing after it.
pub fn check_x509(der: &[u8]) -> Result<()> {
    let (rest, _) =
        x509_parser::parse_x509_certificate(der).map_err(|e| TrustError::Decode(e.to_string()))?;
    if !rest.is_empty() {
        return Err(TrustError::Decode(format!(
            "{} trailing bytes after certificate",
            rest.len()
        )));
    }
    Ok(())
}

fn asn1_to_utc(t: x509_parser::time::ASN1Time) -> DateTime<Utc> {
    Utc.timestamp_opt(t.timestamp(), 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
