//! Verification hook that records every chain it refuses.
//!
//! The outcome is never changed: a trusted chain passes untouched, an
//! untrusted chain is captured into the rejected collection and the
//! original error is returned. Capture failures are logged, not raised.

use std::error::Error as StdError;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{CertificateError, DigitallySignedStruct, DistinguishedName, OtherError, SignatureScheme};
use tracing::{debug, warn};

use crate::error::{Result, TrustError};
use crate::store::CertificateStore;
use crate::types::{CertificateChain, FailureReason};
use crate::verifier::{ChainVerifier, Purpose};

/// Map a verification failure to the reason recorded with the chain.
///
/// Wrapped causes are followed until one names a validity problem.
pub fn classify(err: &TrustError) -> FailureReason {
    classify_source(err)
}

fn classify_source(err: &(dyn StdError + 'static)) -> FailureReason {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(tls) = e.downcast_ref::<rustls::Error>() {
            let reason = classify_tls(tls);
            if reason != FailureReason::Unknown {
                return reason;
            }
        }
        current = e.source();
    }
    FailureReason::Unknown
}

fn classify_tls(err: &rustls::Error) -> FailureReason {
    match err {
        rustls::Error::InvalidCertificate(cert) => match cert {
            CertificateError::Expired | CertificateError::ExpiredContext { .. } => {
                FailureReason::Expired
            }
            CertificateError::NotValidYet | CertificateError::NotValidYetContext { .. } => {
                FailureReason::NotYetValid
            }
            CertificateError::Revoked => FailureReason::Revoked,
            CertificateError::Other(OtherError(inner)) => classify_source(inner.as_ref()),
            _ => FailureReason::Unknown,
        },
        rustls::Error::Other(OtherError(inner)) => classify_source(inner.as_ref()),
        _ => FailureReason::Unknown,
    }
}

/// Wraps a [`ChainVerifier`] and captures refused chains into the store.
#[derive(Debug)]
pub struct CapturingValidator {
    delegate: Arc<dyn ChainVerifier>,
    store: Arc<CertificateStore>,
    provider: Arc<CryptoProvider>,
}

impl CapturingValidator {
    pub fn new(
        delegate: Arc<dyn ChainVerifier>,
        store: Arc<CertificateStore>,
        provider: Arc<CryptoProvider>,
    ) -> Self {
        Self {
            delegate,
            store,
            provider,
        }
    }

    /// Verify `chain` (leaf first); on failure capture it and return the failure.
    pub fn verify(&self, chain: &[CertificateDer<'_>], purpose: &Purpose, now: UnixTime) -> Result<()> {
        let Err(err) = self.delegate.verify(chain, purpose, now) else {
            return Ok(());
        };

        let reason = classify(&err);
        debug!(error = %err, reason = %reason, "chain verification failed");
        self.capture(chain, reason);
        Err(err)
    }

    /// Issuers accepted by the wrapped verifier.
    pub fn accepted_issuers(&self) -> Vec<DistinguishedName> {
        self.delegate.accepted_issuers()
    }

    pub const fn store(&self) -> &Arc<CertificateStore> {
        &self.store
    }

    fn capture(&self, chain: &[CertificateDer<'_>], reason: FailureReason) {
        let captured =
            CertificateChain::capture(chain, reason).and_then(|chain| self.store.capture(chain));
        if let Err(e) = captured {
            warn!(error = %e, "failed to capture rejected certificate chain");
        }
    }

    fn verify_offered(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        purpose: &Purpose,
        now: UnixTime,
    ) -> std::result::Result<(), rustls::Error> {
        let chain: Vec<CertificateDer<'_>> = std::iter::once(end_entity.clone())
            .chain(intermediates.iter().cloned())
            .collect();
        self.verify(&chain, purpose, now).map_err(TrustError::into_tls)
    }
}

impl ServerCertVerifier for CapturingValidator {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        let purpose = Purpose::ServerAuth(server_name.to_owned());
        self.verify_offered(end_entity, intermediates, &purpose, now)?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

impl ClientCertVerifier for CapturingValidator {
    // The anchor set changes at runtime, so no hints are advertised.
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> std::result::Result<ClientCertVerified, rustls::Error> {
        self.verify_offered(end_entity, intermediates, &Purpose::ClientAuth, now)?;
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::TrustAnchorRepository;
    use crate::auth::StaticPermissions;
    use crate::storage::{BlobStore, MemoryBlobStore};
    use crate::types::Status;
    use crate::verifier::LayeredTrustVerifier;
    use rustls::RootCertStore;
    use std::fmt;
    use time::{Duration, OffsetDateTime};

    #[derive(Debug)]
    struct Wrapped(rustls::Error);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "wrapped")
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[derive(Debug)]
    struct Refuses(CertificateError);

    impl ChainVerifier for Refuses {
        fn verify(&self, _: &[CertificateDer<'_>], _: &Purpose, _: UnixTime) -> Result<()> {
            Err(TrustError::UntrustedChain(rustls::Error::InvalidCertificate(
                self.0.clone(),
            )))
        }

        fn accepted_issuers(&self) -> Vec<DistinguishedName> {
            Vec::new()
        }
    }

    fn untrusted(err: CertificateError) -> TrustError {
        TrustError::UntrustedChain(rustls::Error::InvalidCertificate(err))
    }

    fn provider() -> Arc<CryptoProvider> {
        Arc::new(rustls::crypto::ring::default_provider())
    }

    fn generate(name: &str, from_days: i64, to_days: i64) -> CertificateDer<'static> {
        let now = OffsetDateTime::now_utc();
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(vec![name.to_string()]).unwrap();
        params.not_before = now + Duration::days(from_days);
        params.not_after = now + Duration::days(to_days);
        params.self_signed(&key).unwrap().der().clone()
    }

    fn localhost() -> Purpose {
        Purpose::ServerAuth(ServerName::try_from("localhost").unwrap())
    }

    /// Layered verifier whose platform stage trusts one unrelated root.
    fn validator() -> CapturingValidator {
        let mut platform = RootCertStore::empty();
        platform.add(generate("platform.test", -1, 365)).unwrap();

        let repo =
            Arc::new(TrustAnchorRepository::load(Arc::new(MemoryBlobStore::new())).unwrap());
        let verifier = LayeredTrustVerifier::new(platform, &repo, provider()).unwrap();
        let store = Arc::new(CertificateStore::in_memory(
            repo,
            Arc::new(StaticPermissions::read_write()),
        ));
        CapturingValidator::new(verifier, store, provider())
    }

    #[test]
    fn classify_validity_errors() {
        assert_eq!(classify(&untrusted(CertificateError::Expired)), FailureReason::Expired);
        assert_eq!(
            classify(&untrusted(CertificateError::NotValidYet)),
            FailureReason::NotYetValid
        );
        assert_eq!(classify(&untrusted(CertificateError::Revoked)), FailureReason::Revoked);
        assert_eq!(
            classify(&untrusted(CertificateError::UnknownIssuer)),
            FailureReason::Unknown
        );
        assert_eq!(
            classify(&TrustError::Persistence("disk full".into())),
            FailureReason::Unknown
        );
    }

    #[test]
    fn classify_unwraps_nested_causes() {
        let inner = rustls::Error::InvalidCertificate(CertificateError::Expired);
        let nested = untrusted(CertificateError::Other(OtherError(Arc::new(Wrapped(inner)))));
        assert_eq!(classify(&nested), FailureReason::Expired);

        let deeper = TrustError::UntrustedChain(rustls::Error::Other(OtherError(Arc::new(
            Wrapped(rustls::Error::InvalidCertificate(CertificateError::Other(
                OtherError(Arc::new(Wrapped(rustls::Error::InvalidCertificate(
                    CertificateError::NotValidYet,
                )))),
            ))),
        ))));
        assert_eq!(classify(&deeper), FailureReason::NotYetValid);
    }

    #[test]
    fn self_signed_chain_is_captured_as_unknown() {
        let validator = validator();
        let der = generate("localhost", -1, 30);

        let err = validator
            .verify(&[der.clone()], &localhost(), UnixTime::now())
            .unwrap_err();
        assert!(err.is_untrusted());

        let rejected = validator.store().list_rejected().unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].head().encoded(), der.as_ref());
        assert_eq!(rejected[0].head().status(), Status::Rejected);
        assert_eq!(rejected[0].head().error(), FailureReason::Unknown);
    }

    #[test]
    fn expired_chain_is_captured_as_expired() {
        let validator = validator();
        let der = generate("localhost", -30, -1);

        assert!(validator.verify(&[der], &localhost(), UnixTime::now()).is_err());
        let rejected = validator.store().list_rejected().unwrap();
        assert_eq!(rejected[0].head().error(), FailureReason::Expired);
    }

    #[test]
    fn future_chain_is_captured_as_not_yet_valid() {
        let validator = validator();
        let der = generate("localhost", 10, 30);

        assert!(validator
            .verify(&[der], &Purpose::ClientAuth, UnixTime::now())
            .is_err());
        let rejected = validator.store().list_rejected().unwrap();
        assert_eq!(rejected[0].head().error(), FailureReason::NotYetValid);
    }

    #[test]
    fn whole_chain_is_captured_in_order() {
        let validator = validator();
        let chain = vec![
            generate("localhost", -1, 30),
            generate("ca.test", -1, 30),
            generate("root.test", -1, 30),
        ];

        assert!(validator.verify(&chain, &localhost(), UnixTime::now()).is_err());
        assert!(validator.verify(&chain, &localhost(), UnixTime::now()).is_err());

        let rejected = validator.store().list_rejected().unwrap();
        assert_eq!(rejected.len(), 1);
        let captured: Vec<&[u8]> = rejected[0].iter().map(|c| c.encoded()).collect();
        let offered: Vec<&[u8]> = chain.iter().map(AsRef::as_ref).collect();
        assert_eq!(captured, offered);
    }

    #[test]
    fn capture_failure_keeps_original_error() {
        struct FailingBlobs;

        impl BlobStore for FailingBlobs {
            fn read(&self, _: &str) -> Result<Option<Vec<u8>>> {
                Ok(None)
            }

            fn write(&self, _: &str, _: &[u8]) -> Result<()> {
                Err(TrustError::Persistence("disk full".into()))
            }
        }

        #[derive(Debug)]
        struct Unwritable;

        impl crate::storage::DataStore<CertificateChain> for Unwritable {
            fn get(&self, _: &str) -> Result<Option<CertificateChain>> {
                Err(TrustError::Persistence("disk gone".into()))
            }

            fn put(&self, _: &str, _: &CertificateChain) -> Result<()> {
                Err(TrustError::Persistence("disk gone".into()))
            }

            fn remove(&self, _: &str) -> Result<()> {
                Ok(())
            }

            fn get_all(&self) -> Result<std::collections::BTreeMap<String, CertificateChain>> {
                Ok(std::collections::BTreeMap::new())
            }
        }

        let repo = Arc::new(TrustAnchorRepository::load(Arc::new(FailingBlobs)).unwrap());
        let store = Arc::new(CertificateStore::new(
            Arc::new(Unwritable),
            Arc::new(Unwritable),
            repo,
            Arc::new(StaticPermissions::read_write()),
        ));
        let validator = CapturingValidator::new(
            Arc::new(Refuses(CertificateError::Revoked)),
            store,
            provider(),
        );

        let err = validator
            .verify(&[generate("localhost", -1, 30)], &localhost(), UnixTime::now())
            .unwrap_err();
        assert_eq!(
            err.into_tls(),
            rustls::Error::InvalidCertificate(CertificateError::Revoked)
        );
    }

    #[test]
    fn server_hook_returns_tls_error() {
        let validator = validator();
        let der = generate("localhost", -30, -1);
        let name = ServerName::try_from("localhost").unwrap();

        let err = ServerCertVerifier::verify_server_cert(
            &validator,
            &der,
            &[],
            &name,
            &[],
            UnixTime::now(),
        )
        .unwrap_err();
        assert!(matches!(err, rustls::Error::InvalidCertificate(_)));
        assert_eq!(validator.store().list_rejected().unwrap().len(), 1);
        assert!(!ServerCertVerifier::supported_verify_schemes(&validator).is_empty());
    }

    #[test]
    fn approved_chain_passes_without_capture() {
        let validator = validator();
        let der = generate("localhost", -1, 30);
        assert!(validator
            .verify(&[der.clone()], &localhost(), UnixTime::now())
            .is_err());

        let store = validator.store();
        let id = store.list_rejected().unwrap()[0].id().to_string();
        store.approve(&id, &id).unwrap();

        validator
            .verify(&[der.clone()], &localhost(), UnixTime::now())
            .unwrap();
        ClientCertVerifier::verify_client_cert(&validator, &der, &[], UnixTime::now()).unwrap();
        assert!(store.list_rejected().unwrap().is_empty());
    }
}
