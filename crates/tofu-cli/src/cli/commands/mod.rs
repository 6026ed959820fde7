//! Command implementations.

pub mod anchors;
pub mod config;
pub mod list;
pub mod manage;
pub mod probe;
pub mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tofu_trust::{StaticPermissions, TrustContext};

use crate::config::Config;
use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Loaded configuration
    pub config: Config,

    /// Where the configuration was loaded from
    pub config_path: PathBuf,

    /// Output format
    pub output_format: OutputFormat,

    /// Open the store without write permission
    pub read_only: bool,
}

impl Context {
    /// Open the trust store described by the configuration.
    ///
    /// The local operator may read and manage unless `--read-only` was given.
    pub fn trust(&self) -> Result<TrustContext> {
        let permissions = if self.read_only {
            StaticPermissions::read_only()
        } else {
            StaticPermissions::read_write()
        };
        TrustContext::open(self.config.trust.clone(), Arc::new(permissions)).with_context(|| {
            format!(
                "opening trust store at {}",
                self.config.trust.data_dir.display()
            )
        })
    }
}
