//! `tofu probe` - Handshake with a server through the capturing verifier.
//!
//! A refused chain is captured exactly as it would be for any other
//! client using the store, so it shows up in `tofu list rejected`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use colored::Colorize;
use rustls::pki_types::ServerName;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tofu_trust::{ChainView, TrustContext};
use tracing::debug;

use super::Context;
use crate::cli::args::ProbeArgs;
use crate::output::short_fingerprint;

const DEFAULT_PORT: u16 = 443;

#[derive(Debug, Serialize)]
struct ProbeReport {
    target: String,
    server_name: String,
    trusted: bool,
    protocol: Option<String>,
    error: Option<String>,
    captured: Vec<ChainView>,
}

pub async fn execute(ctx: &Context, args: &ProbeArgs) -> Result<()> {
    let (host, port) = split_target(&args.target)?;
    let name = args.server_name.clone().unwrap_or_else(|| host.clone());
    let server_name = ServerName::try_from(name.clone())
        .with_context(|| format!("invalid server name: {name}"))?;

    let trust = ctx.trust()?;
    let before = rejected_ids(&trust)?;
    let connector = TlsConnector::from(Arc::new(trust.client_config()?));

    let limit = Duration::from_secs(args.timeout);
    let tcp = timeout(limit, TcpStream::connect((host.as_str(), port)))
        .await
        .with_context(|| format!("connecting to {host}:{port} timed out"))?
        .with_context(|| format!("connecting to {host}:{port}"))?;
    debug!(%host, port, "tcp connected");

    let handshake = timeout(limit, connector.connect(server_name, tcp))
        .await
        .with_context(|| format!("handshake with {host}:{port} timed out"))?;

    let (protocol, error) = match handshake {
        Ok(stream) => {
            let protocol = stream.get_ref().1.protocol_version().map(|v| format!("{v:?}"));
            (protocol, None)
        }
        Err(e) => (None, Some(e.to_string())),
    };

    let store = trust.store();
    let captured: Vec<_> = store
        .list_rejected()?
        .into_iter()
        .filter(|chain| !before.contains(chain.id()))
        .collect();
    let report = ProbeReport {
        target: format!("{host}:{port}"),
        server_name: name,
        trusted: error.is_none(),
        protocol,
        error,
        captured: ChainView::from_chains(&captured, store.permissions()),
    };

    if ctx.output_format.emit(&report)? {
        return Ok(());
    }
    print_pretty(&report);
    Ok(())
}

fn rejected_ids(trust: &TrustContext) -> Result<BTreeSet<String>> {
    Ok(trust
        .store()
        .list_rejected()?
        .iter()
        .map(|chain| chain.id().to_string())
        .collect())
}

fn print_pretty(report: &ProbeReport) {
    println!("{} {}", "Target:".bold(), report.target.cyan().bold());
    if report.trusted {
        println!(
            "  {} {}",
            "Result:".bold(),
            "trusted".green().bold()
        );
        if let Some(protocol) = &report.protocol {
            println!("  {} {}", "Protocol:".bold(), protocol);
        }
        return;
    }

    println!("  {} {}", "Result:".bold(), "not trusted".red().bold());
    if let Some(error) = &report.error {
        println!("  {} {}", "Error:".bold(), error);
    }

    for view in &report.captured {
        println!();
        println!(
            "{} chain {} ({} certificate(s), {})",
            "Captured:".yellow().bold(),
            short_fingerprint(&view.id).cyan(),
            view.chain.len() + 1,
            view.certificate.error
        );
        for link in &view.certificate.links {
            println!("  tofu {}", link.command());
        }
    }
    if report.captured.is_empty() {
        println!(
            "{}",
            "No new chain captured (already stored or not a certificate failure).".dimmed()
        );
    }
}

/// Split `host[:port]`, accepting bracketed IPv6 literals.
fn split_target(target: &str) -> Result<(String, u16)> {
    if let Some(rest) = target.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| anyhow::anyhow!("unterminated IPv6 literal: {target}"))?;
        let port = match tail.strip_prefix(':') {
            Some(p) => p.parse().with_context(|| format!("invalid port: {p}"))?,
            None if tail.is_empty() => DEFAULT_PORT,
            None => anyhow::bail!("unexpected text after IPv6 literal: {tail}"),
        };
        return Ok((host.to_string(), port));
    }

    match target.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port = port.parse().with_context(|| format!("invalid port: {port}"))?;
            Ok((host.to_string(), port))
        }
        _ => Ok((target.to_string(), DEFAULT_PORT)),
    }
}
