//! Core types for captured and trusted certificates.

pub mod certificate;
pub mod chain;
pub mod details;

pub use certificate::{Certificate, FailureReason, Fingerprint, Status};
pub use chain::CertificateChain;
pub use details::{check_x509, CertificateDetails};
