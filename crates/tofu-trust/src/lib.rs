//! # tofu-trust
//!
//! Trust-on-first-use for `rustls` peers.
//!
//! A chain that fails normal verification is not silently dropped: it is
//! captured, tagged with why it failed, and kept for an operator. Approving
//! a captured certificate adds it to a persisted set of trust anchors that
//! live verification consults from the next handshake on.
//!
//! ## Data Flow
//!
//! ```text
//! handshake
//!   -> CapturingValidator
//!        -> LayeredTrustVerifier
//!             platform roots (webpki-roots + configured bundles)
//!             then stored anchors (TrustAnchorRepository snapshot)
//!        ok   -> handshake continues
//!        fail -> classify -> CertificateStore::capture (rejected) -> same error
//!
//! operator
//!   approve(chain, fingerprint)
//!     -> TrustAnchorRepository::add -> persisted PEM bundle
//!     -> on_change -> LayeredTrustVerifier swaps its anchor stage
//!     -> approved collection
//! ```
//!
//! ## Failing closed
//!
//! - Capture never changes a verification outcome.
//! - Both stages failing reports the platform error, which carries the
//!   most specific reason (expired, not yet valid, ...).
//! - An anchor stage that cannot be rebuilt trusts nothing.

pub mod anchors;
pub mod auth;
pub mod capture;
pub mod config;
pub mod context;
pub mod error;
pub mod fingerprint;
pub mod storage;
pub mod store;
pub mod types;
pub mod upload;
pub mod verifier;
pub mod view;

pub use anchors::{AnchorSet, TrustAnchorRepository};
pub use auth::{Permission, PermissionChecker, StaticPermissions};
pub use capture::{classify, CapturingValidator};
pub use config::TrustConfig;
pub use context::TrustContext;
pub use error::{Result, TrustError};
pub use store::CertificateStore;
pub use types::*;
pub use upload::UPLOAD_LIMIT_BYTES;
pub use verifier::{ChainVerifier, LayeredTrustVerifier, Purpose};
pub use view::{index_links, Action, CertificateView, ChainView, IndexLink, Link};
