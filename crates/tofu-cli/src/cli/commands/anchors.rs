//! `tofu anchors` - Show the certificates trusted through the anchor store.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};
use tofu_trust::CertificateDetails;

use super::Context;
use crate::output::short_fingerprint;

#[derive(Debug, Serialize)]
struct AnchorEntry {
    fingerprint: String,
    subject: Option<String>,
    not_after: Option<String>,
}

#[derive(Tabled)]
struct AnchorRow {
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Not After")]
    not_after: String,
}

pub fn execute(ctx: &Context) -> Result<()> {
    let trust = ctx.trust()?;
    trust.store().permissions().check_read()?;

    let entries: Vec<AnchorEntry> = trust
        .anchors()
        .anchors()
        .iter()
        .map(|(fp, der)| {
            let details = CertificateDetails::from_der(der).ok();
            AnchorEntry {
                fingerprint: fp.clone(),
                subject: details.as_ref().map(|d| d.subject.clone()),
                not_after: details.map(|d| d.not_after.to_rfc3339()),
            }
        })
        .collect();

    if ctx.output_format.emit(&entries)? {
        return Ok(());
    }

    println!("{}", "Trust Anchors:".bold().underline());
    if entries.is_empty() {
        println!("  {}", "None".dimmed());
        return Ok(());
    }

    let rows: Vec<AnchorRow> = entries
        .into_iter()
        .map(|e| AnchorRow {
            fingerprint: short_fingerprint(&e.fingerprint),
            subject: e.subject.unwrap_or_default(),
            not_after: e.not_after.unwrap_or_default(),
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}
