//! Two-stage chain verification: platform roots first, stored anchors second.
//!
//! ```text
//! verify(chain)
//!   -> platform stage   (fixed at construction)   ok -> trusted
//!   -> anchor stage     (swapped on every anchor change)
//!        webpki path to a stored anchor, or the leaf itself is stored
//!                                                ok -> trusted
//!   -> both failed: UntrustedChain(platform error)
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustls::client::danger::ServerCertVerifier;
use rustls::client::{verify_server_name, WebPkiServerVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::danger::ClientCertVerifier;
use rustls::server::{ParsedCertificate, WebPkiClientVerifier};
use rustls::{CertificateError, DistinguishedName, RootCertStore};
use tracing::{debug, error, trace, warn};
use x509_parser::time::ASN1Time;

use crate::anchors::{AnchorSet, TrustAnchorRepository};
use crate::error::{Result, TrustError};
use crate::fingerprint::fingerprint;
use crate::types::Fingerprint;

/// What the offered chain is being checked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Purpose {
    /// A server presenting itself under this name.
    ServerAuth(ServerName<'static>),
    /// A client authenticating to us.
    ClientAuth,
}

/// Decides whether an offered chain (leaf first) is trusted.
pub trait ChainVerifier: fmt::Debug + Send + Sync {
    /// Succeed if the chain is trusted for `purpose` at `now`.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::UntrustedChain` carrying the verification error.
    fn verify(&self, chain: &[CertificateDer<'_>], purpose: &Purpose, now: UnixTime) -> Result<()>;

    /// Subjects of every certificate this verifier treats as a root.
    fn accepted_issuers(&self) -> Vec<DistinguishedName>;
}

/// One immutable trust judgment over a fixed root set.
struct Judgment {
    server: Option<Arc<WebPkiServerVerifier>>,
    client: Option<Arc<dyn ClientCertVerifier>>,
    issuers: Vec<DistinguishedName>,
    pinned: HashSet<Fingerprint>,
}

impl fmt::Debug for Judgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Judgment")
            .field("issuers", &self.issuers.len())
            .field("pinned", &self.pinned.len())
            .finish_non_exhaustive()
    }
}

impl Judgment {
    /// Trusts nothing.
    fn empty() -> Self {
        Self {
            server: None,
            client: None,
            issuers: Vec::new(),
            pinned: HashSet::new(),
        }
    }

    fn from_roots(roots: RootCertStore, provider: &Arc<CryptoProvider>) -> Result<Self> {
        if roots.is_empty() {
            return Ok(Self::empty());
        }

        let issuers = roots.subjects();
        let roots = Arc::new(roots);
        let server = WebPkiServerVerifier::builder_with_provider(roots.clone(), provider.clone())
            .build()
            .map_err(|e| TrustError::Init(e.to_string()))?;
        let client = WebPkiClientVerifier::builder_with_provider(roots, provider.clone())
            .build()
            .map_err(|e| TrustError::Init(e.to_string()))?;

        Ok(Self {
            server: Some(server),
            client: Some(client),
            issuers,
            pinned: HashSet::new(),
        })
    }

    /// Anchors webpki refuses are skipped; only accepted ones are pinned.
    fn from_anchors(anchors: &AnchorSet, provider: &Arc<CryptoProvider>) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        let mut pinned = HashSet::new();
        for (fp, der) in anchors {
            match roots.add(der.clone()) {
                Ok(()) => {
                    pinned.insert(fp.clone());
                }
                Err(e) => warn!(fingerprint = %fp, error = %e, "skipping unusable trust anchor"),
            }
        }
        let mut judgment = Self::from_roots(roots, provider)?;
        judgment.pinned = pinned;
        Ok(judgment)
    }

    fn verify(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        purpose: &Purpose,
        now: UnixTime,
    ) -> std::result::Result<(), rustls::Error> {
        let verdict = match (purpose, &self.server, &self.client) {
            (Purpose::ServerAuth(name), Some(server), _) => server
                .verify_server_cert(end_entity, intermediates, name, &[], now)
                .map(|_| ()),
            (Purpose::ClientAuth, _, Some(client)) => client
                .verify_client_cert(end_entity, intermediates, now)
                .map(|_| ()),
            _ => Err(rustls::Error::InvalidCertificate(
                CertificateError::UnknownIssuer,
            )),
        };

        match verdict {
            Err(_) if self.is_pinned(end_entity, purpose, now) => Ok(()),
            other => other,
        }
    }

    /// The leaf itself is a stored anchor, currently valid, and names the server.
    fn is_pinned(&self, end_entity: &CertificateDer<'_>, purpose: &Purpose, now: UnixTime) -> bool {
        if self.pinned.is_empty() || !self.pinned.contains(&fingerprint(end_entity)) {
            return false;
        }

        let Ok(now) = ASN1Time::from_timestamp(i64::try_from(now.as_secs()).unwrap_or(i64::MAX))
        else {
            return false;
        };
        let valid = x509_parser::parse_x509_certificate(end_entity)
            .is_ok_and(|(_, cert)| cert.validity().is_valid_at(now));
        if !valid {
            return false;
        }

        match purpose {
            Purpose::ServerAuth(name) => ParsedCertificate::try_from(end_entity)
                .and_then(|parsed| verify_server_name(&parsed, name))
                .is_ok(),
            Purpose::ClientAuth => true,
        }
    }
}

/// Platform roots composed with the live trust anchor set.
pub struct LayeredTrustVerifier {
    platform: Judgment,
    stored: RwLock<Arc<Judgment>>,
    provider: Arc<CryptoProvider>,
}

impl fmt::Debug for LayeredTrustVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayeredTrustVerifier")
            .field("platform", &self.platform)
            .field("stored", &*self.stored.read())
            .finish_non_exhaustive()
    }
}

impl LayeredTrustVerifier {
    /// Build both stages and follow `anchors` for changes.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Init` if either stage cannot be built.
    pub fn new(
        platform_roots: RootCertStore,
        anchors: &TrustAnchorRepository,
        provider: Arc<CryptoProvider>,
    ) -> Result<Arc<Self>> {
        let platform = Judgment::from_roots(platform_roots, &provider)?;
        let stored = Judgment::from_anchors(&anchors.anchors(), &provider)?;
        debug!(
            platform_issuers = platform.issuers.len(),
            anchors = stored.pinned.len(),
            "layered trust verifier ready"
        );

        let verifier = Arc::new(Self {
            platform,
            stored: RwLock::new(Arc::new(stored)),
            provider,
        });

        let weak: Weak<Self> = Arc::downgrade(&verifier);
        anchors.on_change(move |set| {
            if let Some(verifier) = weak.upgrade() {
                verifier.rebuild(set);
            }
        });

        Ok(verifier)
    }

    /// Platform stage seeded with the Mozilla root program.
    pub fn with_webpki_roots(
        anchors: &TrustAnchorRepository,
        provider: Arc<CryptoProvider>,
    ) -> Result<Arc<Self>> {
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::new(roots, anchors, provider)
    }

    /// Crypto provider used by both stages.
    pub const fn provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }

    /// Swap in a judgment over `anchors`; on failure trust nothing.
    fn rebuild(&self, anchors: &AnchorSet) {
        let next = match Judgment::from_anchors(anchors, &self.provider) {
            Ok(judgment) => {
                debug!(anchors = anchors.len(), "anchor stage rebuilt");
                judgment
            }
            Err(e) => {
                error!(error = %e, "anchor stage rebuild failed, trusting no stored anchors");
                Judgment::empty()
            }
        };
        *self.stored.write() = Arc::new(next);
    }
}

impl ChainVerifier for LayeredTrustVerifier {
    fn verify(&self, chain: &[CertificateDer<'_>], purpose: &Purpose, now: UnixTime) -> Result<()> {
        let Some((end_entity, intermediates)) = chain.split_first() else {
            return Err(TrustError::UntrustedChain(
                rustls::Error::NoCertificatesPresented,
            ));
        };

        let platform_err = match self.platform.verify(end_entity, intermediates, purpose, now) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let stored = self.stored.read().clone();
        match stored.verify(end_entity, intermediates, purpose, now) {
            Ok(()) => {
                trace!("chain trusted by stored anchors");
                Ok(())
            }
            Err(store_err) => {
                trace!(error = %store_err, "stored anchors rejected chain");
                Err(TrustError::UntrustedChain(platform_err))
            }
        }
    }

    fn accepted_issuers(&self) -> Vec<DistinguishedName> {
        let stored = self.stored.read().clone();
        let mut seen = HashSet::new();
        self.platform
            .issuers
            .iter()
            .chain(stored.issuers.iter())
            .filter(|dn| seen.insert(dn.as_ref().to_vec()))
            .cloned()
            .collect()
    }
}
