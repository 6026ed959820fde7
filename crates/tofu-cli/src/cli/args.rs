//! Command-line argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::output::OutputFormat;

/// Review and manage certificates captured by failed TLS verification.
///
/// Chains that fail verification are kept as rejected. Approving one adds
/// it to the trust anchors used by every later handshake.
#[derive(Parser, Debug)]
#[command(name = "tofu")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: platform config dir)
    #[arg(short, long, env = "TOFU_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Open the store without write permission
    #[arg(long, global = true)]
    pub read_only: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List rejected or approved certificate chains
    List(ListArgs),

    /// Show the current trust anchors
    Anchors,

    /// Approve a certificate inside a rejected chain
    Approve(TargetArgs),

    /// Withdraw approval of an approved certificate
    Reject(TargetArgs),

    /// Delete a rejected chain
    Remove(RemoveArgs),

    /// Trust a certificate file (DER or PEM) directly
    Upload(UploadArgs),

    /// Handshake with a server and report whether it is trusted
    Probe(ProbeArgs),

    /// Show CLI configuration
    Config(ConfigArgs),
}

// ============================================================================
// List command
// ============================================================================

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Which collection to list
    #[arg(value_enum)]
    pub collection: Collection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Collection {
    Rejected,
    Approved,
}

// ============================================================================
// Approve / reject / remove commands
// ============================================================================

#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Id of the stored chain (fingerprint of its first certificate)
    pub chain: String,

    /// Fingerprint of the certificate inside the chain (default: the chain id)
    pub fingerprint: Option<String>,
}

impl TargetArgs {
    pub fn target(&self) -> &str {
        self.fingerprint.as_deref().unwrap_or(&self.chain)
    }
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Id of the rejected chain
    pub chain: String,
}

// ============================================================================
// Upload command
// ============================================================================

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Certificate file, DER or PEM ("-" for stdin)
    pub file: PathBuf,
}

// ============================================================================
// Probe command
// ============================================================================

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Server to connect to, as host or host:port (default port 443)
    pub target: String,

    /// Name to verify instead of the host
    #[arg(long)]
    pub server_name: Option<String>,

    /// Connect and handshake timeout in seconds
    #[arg(short, long, default_value = "10")]
    pub timeout: u64,
}

// ============================================================================
// Config command
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Show config file path
    Path,
}
