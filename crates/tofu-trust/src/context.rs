//! Assembly of repository, store, verifier and capture hook.

use std::io::Read;
use std::sync::Arc;

use rustls::client::danger::ServerCertVerifier;
use rustls::crypto::CryptoProvider;
use rustls::server::danger::ClientCertVerifier;
use rustls::{ClientConfig, RootCertStore};
use tracing::info;

use crate::anchors::{self, TrustAnchorRepository};
use crate::auth::PermissionChecker;
use crate::capture::CapturingValidator;
use crate::config::TrustConfig;
use crate::error::{Result, TrustError};
use crate::storage::{
    BlobStore, DataStore, FileBlobStore, FileDataStore, MemoryBlobStore, MemoryDataStore,
};
use crate::store::{CertificateStore, APPROVED_STORE_NAME, REJECTED_STORE_NAME};
use crate::types::CertificateChain;
use crate::upload::{decode_upload, read_upload};
use crate::verifier::LayeredTrustVerifier;

/// Everything a TLS endpoint needs to verify peers with capture.
#[derive(Debug)]
pub struct TrustContext {
    config: TrustConfig,
    store: Arc<CertificateStore>,
    verifier: Arc<LayeredTrustVerifier>,
    validator: Arc<CapturingValidator>,
    provider: Arc<CryptoProvider>,
}

impl TrustContext {
    /// File-backed context rooted at `config.data_dir`.
    pub fn open(config: TrustConfig, permissions: Arc<dyn PermissionChecker>) -> Result<Self> {
        let root = config.data_dir.clone();
        let rejected = Arc::new(FileDataStore::<CertificateChain>::open(&root, REJECTED_STORE_NAME)?);
        let approved = Arc::new(FileDataStore::<CertificateChain>::open(&root, APPROVED_STORE_NAME)?);
        let blobs = Arc::new(FileBlobStore::open(&root, anchors::STORE_NAME)?);
        let platform = config.platform_root_store()?;

        let context = Self::from_parts(config, rejected, approved, blobs, platform, permissions)?;
        info!(data_dir = %root.display(), anchors = context.store.anchors().len(), "trust context opened");
        Ok(context)
    }

    /// Context whose state lives in memory only.
    pub fn in_memory(platform: RootCertStore, permissions: Arc<dyn PermissionChecker>) -> Result<Self> {
        Self::from_parts(
            TrustConfig::default(),
            Arc::new(MemoryDataStore::<CertificateChain>::new()),
            Arc::new(MemoryDataStore::<CertificateChain>::new()),
            Arc::new(MemoryBlobStore::new()),
            platform,
            permissions,
        )
    }

    /// Wire a context from supplied stores using the `ring` provider.
    pub fn from_parts(
        config: TrustConfig,
        rejected: Arc<dyn DataStore<CertificateChain>>,
        approved: Arc<dyn DataStore<CertificateChain>>,
        blobs: Arc<dyn BlobStore>,
        platform: RootCertStore,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let anchors = Arc::new(TrustAnchorRepository::load(blobs)?);
        let verifier = LayeredTrustVerifier::new(platform, &anchors, provider.clone())?;
        let store = Arc::new(CertificateStore::new(rejected, approved, anchors, permissions));
        let validator = Arc::new(CapturingValidator::new(
            verifier.clone(),
            store.clone(),
            provider.clone(),
        ));

        Ok(Self {
            config,
            store,
            verifier,
            validator,
            provider,
        })
    }

    pub const fn config(&self) -> &TrustConfig {
        &self.config
    }

    pub const fn store(&self) -> &Arc<CertificateStore> {
        &self.store
    }

    pub fn anchors(&self) -> &Arc<TrustAnchorRepository> {
        self.store.anchors()
    }

    pub const fn verifier(&self) -> &Arc<LayeredTrustVerifier> {
        &self.verifier
    }

    pub const fn validator(&self) -> &Arc<CapturingValidator> {
        &self.validator
    }

    pub const fn provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }

    /// Client configuration whose server certificate checks go through capture.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let config = ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| TrustError::Init(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(self.server_verifier())
            .with_no_client_auth();
        Ok(config)
    }

    pub fn server_verifier(&self) -> Arc<dyn ServerCertVerifier> {
        self.validator.clone()
    }

    /// The capture hook for a server that authenticates clients.
    pub fn client_verifier(&self) -> Arc<dyn ClientCertVerifier> {
        self.validator.clone()
    }

    /// Validate and trust an uploaded certificate (DER or PEM).
    pub fn upload(&self, reader: impl Read) -> Result<CertificateChain> {
        let limit = self.config.upload_limit_bytes;
        let bytes = read_upload(reader, limit)?;
        let der = decode_upload(&bytes, limit)?;
        self.store.upload(der)
    }
}
