//! # tofu-cli
//!
//! Operator command-line interface for a `tofu-trust` certificate store.
//!
//! ## Features
//!
//! - **Review**: list rejected and approved chains with the actions each allows
//! - **Decide**: approve, reject or remove captured certificates
//! - **Direct trust**: upload a DER or PEM certificate
//! - **Probe**: handshake with a server through the capturing verifier
//! - **Multiple output formats**: Pretty tables, JSON, YAML

pub mod cli;
pub mod config;
pub mod output;

pub use cli::run;
