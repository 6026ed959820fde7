//! Durable, runtime-mutable set of trust anchors.
//!
//! ## Update flow
//!
//! ```text
//! add(record) / remove(record)
//!   -> take writer lock (one mutation at a time)
//!   -> copy current set, apply change
//!   -> persist PEM bundle to the blob store      (failure: nothing changed)
//!   -> swap in the new snapshot
//!   -> notify listeners with the new snapshot
//! ```
//!
//! Readers clone an `Arc` to the current snapshot and never observe a
//! half-applied change.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use tracing::{debug, info, warn};

use crate::error::{Result, TrustError};
use crate::fingerprint::fingerprint;
use crate::storage::BlobStore;
use crate::types::{check_x509, Certificate, Fingerprint};

/// Blob store name holding the anchor bundle.
pub const STORE_NAME: &str = "trust-store";

/// Blob name of the serialized anchor set.
pub const BLOB_NAME: &str = "trusted_certs.pem";

const PEM_TAG: &str = "CERTIFICATE";

/// Trusted certificates keyed by fingerprint.
pub type AnchorSet = BTreeMap<Fingerprint, CertificateDer<'static>>;

type Listener = Box<dyn Fn(&Arc<AnchorSet>) + Send + Sync>;

/// Persisted trust anchors with change notification.
pub struct TrustAnchorRepository {
    blobs: Arc<dyn BlobStore>,
    current: RwLock<Arc<AnchorSet>>,
    writer: Mutex<()>,
    listeners: RwLock<Vec<Listener>>,
}

impl std::fmt::Debug for TrustAnchorRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustAnchorRepository")
            .field("anchors", &self.current.read().len())
            .field("listeners", &self.listeners.read().len())
            .finish_non_exhaustive()
    }
}

impl TrustAnchorRepository {
    /// Load the persisted anchor set.
    ///
    /// A missing or empty blob yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Persistence` if the stored bundle is corrupt.
    pub fn load(blobs: Arc<dyn BlobStore>) -> Result<Self> {
        let anchors = match blobs.read(BLOB_NAME)? {
            Some(bytes) => decode_bundle(&bytes)?,
            None => AnchorSet::new(),
        };
        debug!(count = anchors.len(), "loaded trust anchors");

        Ok(Self {
            blobs,
            current: RwLock::new(Arc::new(anchors)),
            writer: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        })
    }

    /// Snapshot of the current anchors.
    pub fn anchors(&self) -> Arc<AnchorSet> {
        self.current.read().clone()
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.current.read().contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Register a callback run after every successful `add` or `remove`.
    ///
    /// Callbacks run on the mutating thread while the writer lock is
    /// held; they must not call back into `add`, `remove` or `on_change`.
    pub fn on_change(&self, listener: impl Fn(&Arc<AnchorSet>) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    /// Trust the record's certificate.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::Decode` if the bytes are not exactly one
    /// certificate usable as a webpki trust anchor, and a persistence error
    /// if the bundle cannot be written.
    pub fn add(&self, certificate: &Certificate) -> Result<()> {
        check_x509(certificate.encoded())?;
        let der = CertificateDer::from(certificate.encoded().to_vec());
        check_anchor(&der)?;
        self.update(|anchors| {
            anchors.insert(certificate.fingerprint().to_string(), der);
        })?;
        info!(fingerprint = %certificate.fingerprint(), "trust anchor added");
        Ok(())
    }

    /// Stop trusting the record's certificate.
    pub fn remove(&self, certificate: &Certificate) -> Result<()> {
        self.update(|anchors| {
            anchors.remove(certificate.fingerprint());
        })?;
        info!(fingerprint = %certificate.fingerprint(), "trust anchor removed");
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut AnchorSet)) -> Result<()> {
        let _writer = self.writer.lock();

        let mut next = AnchorSet::clone(&self.current.read());
        apply(&mut next);
        self.blobs.write(BLOB_NAME, &encode_bundle(&next))?;

        let next = Arc::new(next);
        *self.current.write() = Arc::clone(&next);

        for listener in self.listeners.read().iter() {
            listener(&next);
        }
        Ok(())
    }
}

/// Run the same anchor extraction the verifier uses, on a scratch store.
fn check_anchor(der: &CertificateDer<'_>) -> Result<()> {
    let mut scratch = RootCertStore::empty();
    scratch
        .add(der.clone())
        .map_err(|e| TrustError::Decode(format!("not usable as a trust anchor: {e}")))
}

fn encode_bundle(anchors: &AnchorSet) -> Vec<u8> {
    let pems: Vec<pem::Pem> = anchors
        .values()
        .map(|der| pem::Pem::new(PEM_TAG, der.as_ref().to_vec()))
        .collect();
    pem::encode_many(&pems).into_bytes()
}

fn decode_bundle(bytes: &[u8]) -> Result<AnchorSet> {
    let pems = pem::parse_many(bytes)
        .map_err(|e| TrustError::Persistence(format!("corrupt trust store: {e}")))?;

    if pems.is_empty() && !bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(TrustError::Persistence(
            "corrupt trust store: no certificates in non-empty bundle".into(),
        ));
    }

    let mut anchors = AnchorSet::new();
    for p in pems {
        if p.tag() != PEM_TAG {
            return Err(TrustError::Persistence(format!(
                "corrupt trust store: unexpected {} block",
                p.tag()
            )));
        }
        let (rest, _) = x509_parser::parse_x509_certificate(p.contents()).map_err(|e| {
            TrustError::Persistence(format!("corrupt trust store entry: {e}"))
        })?;
        // Loaded anyway; the verifier skips entries webpki refuses.
        if !rest.is_empty() {
            warn!(
                fingerprint = %fingerprint(p.contents()),
                trailing = rest.len(),
                "trust store entry has trailing bytes"
            );
        }
        anchors.insert(fingerprint(p.contents()), CertificateDer::from(p.into_contents()));
    }
    Ok(anchors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;
    use crate::types::{CertificateChain, FailureReason};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingBlobs;

    impl BlobStore for FailingBlobs {
        fn read(&self, _name: &str) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        fn write(&self, _name: &str, _data: &[u8]) -> Result<()> {
            Err(TrustError::Persistence("disk full".into()))
        }
    }

    fn record() -> Certificate {
        let key = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let cert = params.self_signed(&key).unwrap();
        CertificateChain::capture(&[cert.der().to_vec()], FailureReason::Unknown)
            .unwrap()
            .head()
            .clone()
    }

    #[test]
    fn missing_blob_loads_empty() {
        let repo = TrustAnchorRepository::load(Arc::new(MemoryBlobStore::new())).unwrap();
        assert!(repo.is_empty());
    }

    #[test]
    fn add_and_remove_persist() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let repo = TrustAnchorRepository::load(blobs.clone()).unwrap();
        let cert = record();

        repo.add(&cert).unwrap();
        assert!(repo.contains(cert.fingerprint()));

        let reloaded = TrustAnchorRepository::load(blobs.clone()).unwrap();
        assert!(reloaded.contains(cert.fingerprint()));
        assert_eq!(
            reloaded.anchors()[cert.fingerprint()].as_ref(),
            cert.encoded()
        );

        repo.remove(&cert).unwrap();
        assert!(!repo.contains(cert.fingerprint()));
        assert!(TrustAnchorRepository::load(blobs).unwrap().is_empty());
    }

    #[test]
    fn listeners_see_new_snapshot() {
        let repo = TrustAnchorRepository::load(Arc::new(MemoryBlobStore::new())).unwrap();
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let seen_in = Arc::clone(&seen);
        repo.on_change(move |anchors| seen_in.store(anchors.len(), Ordering::SeqCst));

        let cert = record();
        repo.add(&cert).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        repo.remove(&cert).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_persist_changes_nothing() {
        let repo = TrustAnchorRepository::load(Arc::new(FailingBlobs)).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = Arc::clone(&calls);
        repo.on_change(move |_| {
            calls_in.fetch_add(1, Ordering::SeqCst);
        });

        let cert = record();
        assert!(repo.add(&cert).unwrap_err().is_persistence());
        assert!(repo.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn non_certificate_is_refused() {
        let repo = TrustAnchorRepository::load(Arc::new(MemoryBlobStore::new())).unwrap();
        let chain = CertificateChain::capture(&[b"hitchhiker"], FailureReason::Unknown).unwrap();
        assert!(matches!(
            repo.add(chain.head()),
            Err(TrustError::Decode(_))
        ));
        assert!(repo.is_empty());
    }

    #[test]
    fn trailing_bytes_are_refused_before_persisting() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let repo = TrustAnchorRepository::load(blobs.clone()).unwrap();
        let good = record();
        repo.add(&good).unwrap();

        let mut padded = good.encoded().to_vec();
        padded.extend_from_slice(b"junk");
        let chain = CertificateChain::capture(&[padded], FailureReason::Unknown).unwrap();
        assert!(matches!(repo.add(chain.head()), Err(TrustError::Decode(_))));

        assert_eq!(repo.len(), 1);
        assert_eq!(TrustAnchorRepository::load(blobs).unwrap().len(), 1);
    }

    #[test]
    fn bundle_entry_with_trailing_bytes_still_loads() {
        let good = record();
        let mut padded = record().encoded().to_vec();
        padded.extend_from_slice(b"junk");
        let bundle = pem::encode_many(&[
            pem::Pem::new("CERTIFICATE", good.encoded().to_vec()),
            pem::Pem::new("CERTIFICATE", padded),
        ]);

        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.write(BLOB_NAME, bundle.as_bytes()).unwrap();
        let repo = TrustAnchorRepository::load(blobs).unwrap();
        assert_eq!(repo.len(), 2);
        assert!(repo.contains(good.fingerprint()));
    }

    #[test]
    fn concurrent_writers_are_serialized() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let repo = TrustAnchorRepository::load(blobs.clone()).unwrap();
        let certs: Vec<Certificate> = (0..8).map(|_| record()).collect();

        std::thread::scope(|s| {
            for cert in &certs {
                let repo = &repo;
                s.spawn(move || repo.add(cert).unwrap());
            }
        });

        assert_eq!(repo.len(), certs.len());
        let reloaded = TrustAnchorRepository::load(blobs).unwrap();
        assert_eq!(reloaded.len(), certs.len());
    }

    #[test]
    fn corrupt_bundle_fails_load() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.write(BLOB_NAME, b"definitely not pem").unwrap();
        assert!(TrustAnchorRepository::load(blobs.clone()).is_err());

        let bogus = pem::encode(&pem::Pem::new("CERTIFICATE", b"junk".to_vec()));
        blobs.write(BLOB_NAME, bogus.as_bytes()).unwrap();
        assert!(TrustAnchorRepository::load(blobs.clone()).is_err());

        blobs.write(BLOB_NAME, b"\n").unwrap();
        assert!(TrustAnchorRepository::load(blobs).unwrap().is_empty());
    }
}
