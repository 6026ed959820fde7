//! Validation of operator-submitted certificates.

use std::io::Read;

use crate::error::{Result, TrustError};
use crate::types::check_x509;

/// Largest accepted upload.
pub const UPLOAD_LIMIT_BYTES: usize = 50_000;

const TOO_LARGE: &str = "file too large";
const NOT_A_CERTIFICATE: &str = "file is not a valid certificate";

/// Read an upload, refusing anything longer than `limit` bytes.
pub fn read_upload(reader: impl Read, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    reader
        .take(cap)
        .read_to_end(&mut buf)
        .map_err(|e| TrustError::io("upload", e))?;

    if buf.len() > limit {
        return Err(TrustError::InvalidInput(TOO_LARGE.into()));
    }
    Ok(buf)
}

/// DER bytes of an uploaded certificate given as DER or PEM.
///
/// For PEM input the first `CERTIFICATE` block is used.
pub fn decode_upload(bytes: &[u8], limit: usize) -> Result<Vec<u8>> {
    if bytes.len() > limit {
        return Err(TrustError::InvalidInput(TOO_LARGE.into()));
    }

    let der = if check_x509(bytes).is_ok() {
        bytes.to_vec()
    } else {
        pem::parse_many(bytes)
            .ok()
            .and_then(|blocks| blocks.into_iter().find(|p| p.tag() == "CERTIFICATE"))
            .map(pem::Pem::into_contents)
            .ok_or_else(|| TrustError::InvalidInput(NOT_A_CERTIFICATE.into()))?
    };

    check_x509(&der).map_err(|_| TrustError::InvalidInput(NOT_A_CERTIFICATE.into()))?;
    Ok(der)
}
