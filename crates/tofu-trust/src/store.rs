//! Rejected and approved collections and the transitions between them.
//!
//! Both collections map a fingerprint to a chain. A captured chain sits
//! in the rejected collection under the fingerprint of its leaf; approving
//! any record inside it stores the sub-chain starting at that record in
//! the approved collection under the record's own fingerprint, and adds
//! the record to the trust anchors.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::anchors::TrustAnchorRepository;
use crate::auth::PermissionChecker;
use crate::error::{Result, TrustError};
use crate::storage::{DataStore, MemoryDataStore};
use crate::types::{check_x509, Certificate, CertificateChain};

/// Collection of chains that failed verification.
pub const REJECTED_STORE_NAME: &str = "rejected-certificates";

/// Collection of operator-approved chains.
pub const APPROVED_STORE_NAME: &str = "approved-certificates";

type ChainStore = Arc<dyn DataStore<CertificateChain>>;

/// Owner of the rejected and approved collections.
pub struct CertificateStore {
    rejected: ChainStore,
    approved: ChainStore,
    anchors: Arc<TrustAnchorRepository>,
    permissions: Arc<dyn PermissionChecker>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for CertificateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateStore")
            .field("anchors", &self.anchors)
            .finish_non_exhaustive()
    }
}

impl CertificateStore {
    pub fn new(
        rejected: ChainStore,
        approved: ChainStore,
        anchors: Arc<TrustAnchorRepository>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self {
            rejected,
            approved,
            anchors,
            permissions,
            lock: Mutex::new(()),
        }
    }

    /// A store whose collections live in memory.
    pub fn in_memory(
        anchors: Arc<TrustAnchorRepository>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self::new(
            Arc::new(MemoryDataStore::<CertificateChain>::new()),
            Arc::new(MemoryDataStore::<CertificateChain>::new()),
            anchors,
            permissions,
        )
    }

    pub fn anchors(&self) -> &Arc<TrustAnchorRepository> {
        &self.anchors
    }

    pub fn permissions(&self) -> &dyn PermissionChecker {
        self.permissions.as_ref()
    }

    /// All rejected chains, ordered by id.
    pub fn list_rejected(&self) -> Result<Vec<CertificateChain>> {
        self.permissions.check_read()?;
        Ok(self.rejected.get_all()?.into_values().collect())
    }

    /// All approved chains, ordered by id.
    pub fn list_approved(&self) -> Result<Vec<CertificateChain>> {
        self.permissions.check_read()?;
        Ok(self.approved.get_all()?.into_values().collect())
    }

    /// Record a chain that failed verification.
    ///
    /// Returns `false` without touching the collection if a chain with the
    /// same id was already captured.
    pub fn capture(&self, chain: CertificateChain) -> Result<bool> {
        let _guard = self.lock.lock();

        if self.rejected.get(chain.id())?.is_some() {
            debug!(chain = %chain.id(), "chain already captured");
            return Ok(false);
        }
        self.rejected.put(chain.id(), &chain)?;
        info!(
            chain = %chain.id(),
            length = chain.len(),
            error = %chain.head().error(),
            "captured rejected certificate chain"
        );
        Ok(true)
    }

    /// Approve the record `fingerprint` inside rejected chain `chain_id`.
    pub fn approve(&self, chain_id: &str, fingerprint: &str) -> Result<()> {
        self.permissions.check_write()?;
        let _guard = self.lock.lock();

        let chain = self
            .rejected
            .get(chain_id)?
            .ok_or_else(|| TrustError::not_found(format!("rejected chain {chain_id}")))?;
        let mut approved = chain.suffix_from(fingerprint).ok_or_else(|| {
            TrustError::not_found(format!("certificate {fingerprint} in chain {chain_id}"))
        })?;
        approved.head_mut().approve()?;

        self.store_approved(&approved)?;
        info!(chain = %chain_id, fingerprint = %fingerprint, "certificate approved");
        Ok(())
    }

    /// Withdraw approval of the record `fingerprint` inside approved chain `chain_id`.
    ///
    /// Only the head of an approved chain is itself approved; naming one of
    /// its issuers fails with `InvalidTransition`.
    pub fn reject(&self, chain_id: &str, fingerprint: &str) -> Result<()> {
        self.permissions.check_write()?;
        let _guard = self.lock.lock();

        let chain = self
            .approved
            .get(chain_id)?
            .ok_or_else(|| TrustError::not_found(format!("approved chain {chain_id}")))?;
        let target = chain.find(fingerprint).ok_or_else(|| {
            TrustError::not_found(format!("certificate {fingerprint} in chain {chain_id}"))
        })?;
        if target.fingerprint() != chain.id() {
            return Err(TrustError::InvalidTransition {
                fingerprint: fingerprint.to_string(),
                status: target.status(),
            });
        }

        let mut rejected = chain.clone();
        rejected.head_mut().reject()?;
        let head = chain.head();

        self.anchors.remove(head)?;
        if let Err(e) = self.approved.remove(chain_id) {
            self.rollback(head, true);
            return Err(e);
        }
        if self.rejected.get(fingerprint)?.is_none() {
            self.rejected.put(fingerprint, &rejected)?;
        }

        info!(chain = %chain_id, fingerprint = %fingerprint, "certificate rejected");
        Ok(())
    }

    /// Delete a rejected chain.
    pub fn remove_rejected(&self, id: &str) -> Result<()> {
        self.permissions.check_write()?;
        let _guard = self.lock.lock();

        match self.rejected.get(id) {
            Ok(Some(_)) => {}
            Ok(None) => return Err(TrustError::not_found(format!("rejected chain {id}"))),
            // Unreadable records are still removable.
            Err(e) if e.is_persistence() => {
                warn!(chain = %id, error = %e, "removing unreadable rejected chain");
            }
            Err(e) => return Err(e),
        }
        self.rejected.remove(id)?;
        info!(chain = %id, "rejected chain removed");
        Ok(())
    }

    /// Trust a certificate directly, skipping the rejected stage.
    pub fn upload(&self, der: Vec<u8>) -> Result<CertificateChain> {
        self.permissions.check_write()?;
        check_x509(&der)?;
        let chain = CertificateChain::uploaded(der);

        let _guard = self.lock.lock();
        self.store_approved(&chain)?;
        info!(fingerprint = %chain.id(), "certificate uploaded");
        Ok(chain)
    }

    /// Anchor first, then collections; undo the anchor if the approved write fails.
    fn store_approved(&self, chain: &CertificateChain) -> Result<()> {
        let head = chain.head();
        let was_anchor = self.anchors.contains(head.fingerprint());

        self.anchors.add(head)?;
        if let Err(e) = self.approved.put(head.fingerprint(), chain) {
            if !was_anchor {
                self.rollback(head, false);
            }
            return Err(e);
        }
        if self.rejected.get(head.fingerprint())?.is_some() {
            self.rejected.remove(head.fingerprint())?;
        }
        Ok(())
    }

    fn rollback(&self, certificate: &Certificate, restore: bool) {
        let undone = if restore {
            self.anchors.add(certificate)
        } else {
            self.anchors.remove(certificate)
        };
        if let Err(e) = undone {
            warn!(
                fingerprint = %certificate.fingerprint(),
                error = %e,
                "trust anchor rollback failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticPermissions;
    use crate::storage::MemoryBlobStore;
    use crate::types::{FailureReason, Status};
    use std::collections::BTreeMap;

    struct FailingPuts;

    impl DataStore<CertificateChain> for FailingPuts {
        fn get(&self, _id: &str) -> Result<Option<CertificateChain>> {
            Ok(None)
        }

        fn put(&self, _id: &str, _item: &CertificateChain) -> Result<()> {
            Err(TrustError::Persistence("disk full".into()))
        }

        fn remove(&self, _id: &str) -> Result<()> {
            Ok(())
        }

        fn get_all(&self) -> Result<BTreeMap<String, CertificateChain>> {
            Ok(BTreeMap::new())
        }
    }

    fn generate(name: &str) -> Vec<u8> {
        let key = rcgen::KeyPair::generate().unwrap();
        let params = rcgen::CertificateParams::new(vec![name.to_string()]).unwrap();
        params.self_signed(&key).unwrap().der().to_vec()
    }

    fn anchors() -> Arc<TrustAnchorRepository> {
        Arc::new(TrustAnchorRepository::load(Arc::new(MemoryBlobStore::new())).unwrap())
    }

    fn store_with(permissions: StaticPermissions) -> CertificateStore {
        CertificateStore::in_memory(anchors(), Arc::new(permissions))
    }

    fn three_chain() -> CertificateChain {
        let ders = vec![generate("leaf.test"), generate("ca.test"), generate("root.test")];
        CertificateChain::capture(&ders, FailureReason::Unknown).unwrap()
    }

    #[test]
    fn capture_is_first_seen_wins() {
        let store = store_with(StaticPermissions::read_write());
        let der = generate("localhost");
        let first = CertificateChain::capture(&[&der], FailureReason::Unknown).unwrap();
        let second = CertificateChain::capture(&[&der], FailureReason::Expired).unwrap();

        assert!(store.capture(first).unwrap());
        assert!(!store.capture(second).unwrap());

        let rejected = store.list_rejected().unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].head().error(), FailureReason::Unknown);
    }

    #[test]
    fn capture_needs_no_permission() {
        let store = store_with(StaticPermissions::denied());
        assert!(store.capture(three_chain()).unwrap());
        assert!(store.list_rejected().unwrap_err().is_unauthorized());
    }

    #[test]
    fn management_needs_write() {
        let store = store_with(StaticPermissions::read_only());
        let chain = three_chain();
        let id = chain.id().to_string();
        store.capture(chain).unwrap();

        assert!(store.approve(&id, &id).unwrap_err().is_unauthorized());
        assert!(store.reject(&id, &id).unwrap_err().is_unauthorized());
        assert!(store.remove_rejected(&id).unwrap_err().is_unauthorized());
        assert!(store.upload(generate("x.test")).unwrap_err().is_unauthorized());
        assert_eq!(store.list_rejected().unwrap().len(), 1);
        assert!(store.anchors().is_empty());
    }

    #[test]
    fn approve_reject_approve_round_trip() {
        let store = store_with(StaticPermissions::read_write());
        let chain = three_chain();
        let id = chain.id().to_string();
        store.capture(chain).unwrap();

        store.approve(&id, &id).unwrap();
        assert!(store.anchors().contains(&id));
        let approved = store.list_approved().unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].head().status(), Status::Approved);
        assert_eq!(approved[0].len(), 3);
        assert!(store.list_rejected().unwrap().is_empty());

        store.reject(&id, &id).unwrap();
        assert!(!store.anchors().contains(&id));
        assert!(store.list_approved().unwrap().is_empty());
        let rejected = store.list_rejected().unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].head().status(), Status::Rejected);

        store.approve(&id, &id).unwrap();
        assert!(store.anchors().contains(&id));
        assert_eq!(
            store.list_approved().unwrap()[0].head().status(),
            Status::Approved
        );
    }

    #[test]
    fn approve_unknown_fingerprint_changes_nothing() {
        let store = store_with(StaticPermissions::read_write());
        let chain = three_chain();
        let id = chain.id().to_string();
        store.capture(chain).unwrap();
        let before = store.list_rejected().unwrap();

        let err = store.approve(&id, &"0".repeat(64)).unwrap_err();
        assert!(err.is_not_found());
        assert!(store.approve(&"0".repeat(64), &id).unwrap_err().is_not_found());

        assert_eq!(store.list_rejected().unwrap(), before);
        assert!(store.list_approved().unwrap().is_empty());
        assert!(store.anchors().is_empty());
    }

    // Each fingerprint is its own approval target: approving an issuer does
    // not approve the leaf below it, and the captured chain stays rejected.
    #[test]
    fn ancestor_is_approved_independently() {
        let store = store_with(StaticPermissions::read_write());
        let chain = three_chain();
        let id = chain.id().to_string();
        let ca = chain.issuers()[0].fingerprint().to_string();
        store.capture(chain).unwrap();

        store.approve(&id, &ca).unwrap();

        assert!(store.anchors().contains(&ca));
        assert!(!store.anchors().contains(&id));
        let approved = store.list_approved().unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id(), ca);
        assert_eq!(approved[0].len(), 2);

        let rejected = store.list_rejected().unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].head().status(), Status::Rejected);

        store.approve(&id, &id).unwrap();
        assert_eq!(store.list_approved().unwrap().len(), 2);
        assert!(store.list_rejected().unwrap().is_empty());
    }

    #[test]
    fn rejecting_an_issuer_of_an_approved_chain_is_refused() {
        let store = store_with(StaticPermissions::read_write());
        let chain = three_chain();
        let id = chain.id().to_string();
        let ca = chain.issuers()[0].fingerprint().to_string();
        store.capture(chain).unwrap();
        store.approve(&id, &id).unwrap();

        assert!(matches!(
            store.reject(&id, &ca),
            Err(TrustError::InvalidTransition {
                status: Status::Rejected,
                ..
            })
        ));
        assert!(store.reject(&id, &"0".repeat(64)).unwrap_err().is_not_found());
        assert!(store.anchors().contains(&id));
    }

    #[test]
    fn reject_keeps_existing_capture_history() {
        let store = store_with(StaticPermissions::read_write());
        let chain = three_chain();
        let id = chain.id().to_string();
        let ca = chain.issuers()[0].fingerprint().to_string();
        store.capture(chain.clone()).unwrap();
        store.approve(&id, &ca).unwrap();

        let issuers: Vec<&[u8]> = chain.issuers().iter().map(Certificate::encoded).collect();
        let later = CertificateChain::capture(&issuers, FailureReason::Expired).unwrap();
        assert!(store.capture(later.clone()).unwrap());

        store.reject(&ca, &ca).unwrap();

        let rejected = store.list_rejected().unwrap();
        assert_eq!(rejected.len(), 2);
        assert!(rejected.contains(&chain));
        assert!(rejected.contains(&later));
        assert!(!store.anchors().contains(&ca));
        assert!(store.list_approved().unwrap().is_empty());
    }

    #[test]
    fn reject_moves_record_back_to_rejected() {
        let store = store_with(StaticPermissions::read_write());
        let chain = three_chain();
        let id = chain.id().to_string();
        let ca = chain.issuers()[0].fingerprint().to_string();
        store.capture(chain).unwrap();
        store.approve(&id, &ca).unwrap();

        store.reject(&ca, &ca).unwrap();

        let rejected = store.list_rejected().unwrap();
        assert_eq!(rejected.len(), 2);
        let moved = rejected.iter().find(|c| c.id() == ca).unwrap();
        assert_eq!(moved.head().status(), Status::Rejected);
        assert_eq!(moved.len(), 2);
    }

    #[test]
    fn remove_rejected() {
        let store = store_with(StaticPermissions::read_write());
        let chain = three_chain();
        let id = chain.id().to_string();
        store.capture(chain).unwrap();

        store.remove_rejected(&id).unwrap();
        assert!(store.list_rejected().unwrap().is_empty());
        assert!(store.remove_rejected(&id).unwrap_err().is_not_found());
    }

    #[test]
    fn upload_trusts_directly() {
        let store = store_with(StaticPermissions::read_write());
        let chain = store.upload(generate("upload.test")).unwrap();

        assert!(chain.head().is_uploaded());
        assert_eq!(chain.head().status(), Status::Approved);
        assert!(store.anchors().contains(chain.id()));
        assert_eq!(store.list_approved().unwrap(), vec![chain.clone()]);

        store.reject(chain.id(), chain.id()).unwrap();
        assert!(store.anchors().is_empty());
        assert_eq!(store.list_rejected().unwrap().len(), 1);
    }

    #[test]
    fn upload_refuses_non_certificates() {
        let store = store_with(StaticPermissions::read_write());
        assert!(matches!(
            store.upload(b"hitchhiker".to_vec()),
            Err(TrustError::Decode(_))
        ));
        assert!(store.anchors().is_empty());
    }

    #[test]
    fn failed_approved_write_rolls_back_anchor() {
        let store = CertificateStore::new(
            Arc::new(MemoryDataStore::<CertificateChain>::new()),
            Arc::new(FailingPuts),
            anchors(),
            Arc::new(StaticPermissions::read_write()),
        );
        let chain = three_chain();
        let id = chain.id().to_string();
        store.capture(chain).unwrap();

        assert!(store.approve(&id, &id).unwrap_err().is_persistence());
        assert!(store.anchors().is_empty());
        assert_eq!(store.list_rejected().unwrap().len(), 1);
    }

    #[test]
    fn corrupt_rejected_record_is_hidden_but_removable() {
        let dir = tempfile::tempdir().unwrap();
        let rejected = crate::storage::FileDataStore::<CertificateChain>::open(
            dir.path(),
            REJECTED_STORE_NAME,
        )
        .unwrap();
        let store = CertificateStore::new(
            Arc::new(rejected),
            Arc::new(MemoryDataStore::<CertificateChain>::new()),
            anchors(),
            Arc::new(StaticPermissions::read_write()),
        );
        let chain = three_chain();
        store.capture(chain.clone()).unwrap();

        let bad = "f".repeat(64);
        std::fs::write(
            dir.path().join(REJECTED_STORE_NAME).join(format!("{bad}.json")),
            b"{\"truncated",
        )
        .unwrap();

        let listed = store.list_rejected().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), chain.id());

        store.remove_rejected(&bad).unwrap();
        assert!(store.remove_rejected(&bad).unwrap_err().is_not_found());
        assert_eq!(store.list_rejected().unwrap().len(), 1);
    }
}
