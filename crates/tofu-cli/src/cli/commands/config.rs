//! `tofu config` - CLI configuration display.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::cli::args::{ConfigArgs, ConfigCommands};
use crate::output::OutputFormat;

pub fn execute(ctx: &Context, args: &ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(ctx),
        ConfigCommands::Path => show_path(ctx),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    let config = &ctx.config;

    if ctx.output_format.emit(config)? {
        return Ok(());
    }

    println!("{}", "Current Configuration:".bold());
    println!();
    println!(
        "  {} {}",
        "output_format:".bold(),
        config.output_format.unwrap_or(OutputFormat::Pretty)
    );

    let trust = &config.trust;
    println!("  {} {}", "data_dir:".bold(), trust.data_dir.display());
    println!("  {} {}", "upload_limit_bytes:".bold(), trust.upload_limit_bytes);
    println!("  {} {}", "platform_roots:".bold(), trust.platform_roots);
    if trust.extra_platform_roots.is_empty() {
        println!("  {} {}", "extra_platform_roots:".bold(), "(none)".dimmed());
    } else {
        println!("  {}", "extra_platform_roots:".bold());
        for path in &trust.extra_platform_roots {
            println!("    - {}", path.display());
        }
    }

    Ok(())
}

fn show_path(ctx: &Context) -> Result<()> {
    println!("{}", ctx.config_path.display());
    Ok(())
}
