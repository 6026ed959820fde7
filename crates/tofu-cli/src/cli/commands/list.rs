//! `tofu list` - Show rejected or approved certificate chains.

use anyhow::Result;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};
use tofu_trust::{ChainView, CertificateView, FailureReason, Status};

use super::Context;
use crate::cli::args::{Collection, ListArgs};
use crate::output::short_fingerprint;

#[derive(Tabled)]
struct ChainRow {
    #[tabled(rename = "Chain")]
    chain: String,
    #[tabled(rename = "Depth")]
    depth: usize,
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Reason")]
    reason: String,
    #[tabled(rename = "Not After")]
    not_after: String,
    #[tabled(rename = "Since")]
    since: String,
}

pub fn execute(ctx: &Context, args: &ListArgs) -> Result<()> {
    let trust = ctx.trust()?;
    let store = trust.store();

    let chains = match args.collection {
        Collection::Rejected => store.list_rejected()?,
        Collection::Approved => store.list_approved()?,
    };
    let views = ChainView::from_chains(&chains, store.permissions());

    if ctx.output_format.emit(&views)? {
        return Ok(());
    }
    print_pretty(&views, args.collection);
    Ok(())
}

fn print_pretty(views: &[ChainView], collection: Collection) {
    let title = match collection {
        Collection::Rejected => "Rejected Certificates:",
        Collection::Approved => "Approved Certificates:",
    };
    println!("{}", title.bold().underline());

    if views.is_empty() {
        println!("  {}", "None".dimmed());
        return;
    }

    let mut rows = Vec::new();
    for view in views {
        rows.push(row(&view.id, 0, &view.certificate));
        for (depth, issuer) in view.chain.iter().enumerate() {
            rows.push(row(&view.id, depth + 1, issuer));
        }
    }
    println!("{}", Table::new(&rows).with(Style::rounded()));

    let commands: Vec<String> = views
        .iter()
        .flat_map(|v| std::iter::once(&v.certificate).chain(&v.chain))
        .flat_map(|c| &c.links)
        .map(tofu_trust::Link::command)
        .collect();
    if !commands.is_empty() {
        println!();
        println!("{}", "Available actions:".bold());
        for command in commands {
            println!("  tofu {command}");
        }
    }
}

fn row(chain: &str, depth: usize, view: &CertificateView) -> ChainRow {
    let (subject, not_after) = view.details.as_ref().map_or_else(
        || ("(undecodable)".to_string(), String::new()),
        |d| (d.subject.clone(), d.not_after.format("%Y-%m-%d").to_string()),
    );

    let status = match view.status {
        Status::Rejected => "rejected".red().to_string(),
        Status::Approved if view.uploaded => "uploaded".green().to_string(),
        Status::Approved => "approved".green().to_string(),
    };
    let reason = match view.error {
        FailureReason::Unknown => view.error.to_string(),
        other => other.to_string().yellow().to_string(),
    };

    ChainRow {
        chain: if depth == 0 {
            short_fingerprint(chain)
        } else {
            String::new()
        },
        depth,
        subject,
        status,
        reason,
        not_after,
        since: view.timestamp.format("%Y-%m-%d %H:%M").to_string(),
    }
}
