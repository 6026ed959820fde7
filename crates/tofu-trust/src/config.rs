//! Trust store configuration.

use std::path::{Path, PathBuf};

use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TrustError};
use crate::upload::UPLOAD_LIMIT_BYTES;

/// Where trust state lives and which roots the platform stage uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Directory holding the collections and the anchor blob store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Largest accepted certificate upload (default: 50000 bytes).
    #[serde(default = "default_upload_limit")]
    pub upload_limit_bytes: usize,

    /// Include the Mozilla root program in the platform stage.
    #[serde(default = "default_true")]
    pub platform_roots: bool,

    /// Extra PEM bundles added to the platform stage.
    #[serde(default)]
    pub extra_platform_roots: Vec<PathBuf>,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            upload_limit_bytes: default_upload_limit(),
            platform_roots: true,
            extra_platform_roots: Vec::new(),
        }
    }
}

impl TrustConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| TrustError::io(path.display().to_string(), e))?;
            toml::from_str(&content).map_err(|e| TrustError::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }

    /// Roots for the platform stage.
    pub fn platform_root_store(&self) -> Result<RootCertStore> {
        let mut roots = if self.platform_roots {
            RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned())
        } else {
            RootCertStore::empty()
        };

        for path in &self.extra_platform_roots {
            let content =
                std::fs::read(path).map_err(|e| TrustError::io(path.display().to_string(), e))?;
            let blocks = pem::parse_many(&content)
                .map_err(|e| TrustError::Config(format!("{}: {e}", path.display())))?;

            let mut added = 0usize;
            for block in blocks.into_iter().filter(|p| p.tag() == "CERTIFICATE") {
                roots
                    .add(CertificateDer::from(block.into_contents()))
                    .map_err(|e| TrustError::Config(format!("{}: {e}", path.display())))?;
                added += 1;
            }
            if added == 0 {
                return Err(TrustError::Config(format!(
                    "{}: no certificates found",
                    path.display()
                )));
            }
            debug!(path = %path.display(), added, "loaded extra platform roots");
        }

        Ok(roots)
    }
}

// Default value functions for serde.
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tofu-trust")
}

const fn default_upload_limit() -> usize {
    UPLOAD_LIMIT_BYTES
}

const fn default_true() -> bool {
    true
}
