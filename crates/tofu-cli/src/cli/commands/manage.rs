//! `tofu approve|reject|remove` - Operator decisions on stored certificates.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use super::Context;
use crate::cli::args::{RemoveArgs, TargetArgs};
use crate::output::short_fingerprint;

#[derive(Debug, Serialize)]
struct Outcome<'a> {
    action: &'static str,
    chain: &'a str,
    fingerprint: &'a str,
    anchors: usize,
}

pub fn approve(ctx: &Context, args: &TargetArgs) -> Result<()> {
    let trust = ctx.trust()?;
    trust.store().approve(&args.chain, args.target())?;
    report(ctx, "approved", &args.chain, args.target(), trust.anchors().len())
}

pub fn reject(ctx: &Context, args: &TargetArgs) -> Result<()> {
    let trust = ctx.trust()?;
    trust.store().reject(&args.chain, args.target())?;
    report(ctx, "rejected", &args.chain, args.target(), trust.anchors().len())
}

pub fn remove(ctx: &Context, args: &RemoveArgs) -> Result<()> {
    let trust = ctx.trust()?;
    trust.store().remove_rejected(&args.chain)?;
    report(ctx, "removed", &args.chain, &args.chain, trust.anchors().len())
}

fn report(ctx: &Context, action: &'static str, chain: &str, fingerprint: &str, anchors: usize) -> Result<()> {
    let outcome = Outcome {
        action,
        chain,
        fingerprint,
        anchors,
    };
    if ctx.output_format.emit(&outcome)? {
        return Ok(());
    }

    println!(
        "{} Certificate {} {}.",
        "Success:".green().bold(),
        short_fingerprint(fingerprint).cyan(),
        action
    );
    println!("{}", format!("{anchors} trust anchor(s) active").dimmed());
    Ok(())
}
