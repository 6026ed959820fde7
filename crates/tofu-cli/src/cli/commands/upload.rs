//! `tofu upload` - Trust a certificate file directly.

use std::fs::File;
use std::io::Read;

use anyhow::{Context as _, Result};
use colored::Colorize;
use tofu_trust::ChainView;

use super::Context;
use crate::cli::args::UploadArgs;
use crate::output::short_fingerprint;

pub fn execute(ctx: &Context, args: &UploadArgs) -> Result<()> {
    let trust = ctx.trust()?;

    let reader: Box<dyn Read> = if args.file.as_os_str() == "-" {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(
            File::open(&args.file)
                .with_context(|| format!("opening {}", args.file.display()))?,
        )
    };
    let chain = trust.upload(reader)?;
    let view = ChainView::new(&chain, trust.store().permissions());

    if ctx.output_format.emit(&view)? {
        return Ok(());
    }

    let subject = view
        .certificate
        .details
        .as_ref()
        .map_or("(undecodable)", |d| d.subject.as_str());
    println!(
        "{} Trusted {} ({}).",
        "Success:".green().bold(),
        short_fingerprint(&view.id).cyan(),
        subject
    );
    Ok(())
}
