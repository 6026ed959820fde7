//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::output::OutputFormat;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Load configuration
    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => Config::path()?,
    };
    let config = Config::load_from(&config_path)?;

    // Determine output format
    let output_format = cli
        .output
        .or(config.output_format)
        .unwrap_or(OutputFormat::Pretty);

    // Create context for commands
    let ctx = commands::Context {
        config,
        config_path,
        output_format,
        read_only: cli.read_only,
    };

    // Dispatch to appropriate command
    match cli.command {
        Commands::List(args) => commands::list::execute(&ctx, &args),
        Commands::Anchors => commands::anchors::execute(&ctx),
        Commands::Approve(args) => commands::manage::approve(&ctx, &args),
        Commands::Reject(args) => commands::manage::reject(&ctx, &args),
        Commands::Remove(args) => commands::manage::remove(&ctx, &args),
        Commands::Upload(args) => commands::upload::execute(&ctx, &args),
        Commands::Probe(args) => commands::probe::execute(&ctx, &args).await,
        Commands::Config(args) => commands::config::execute(&ctx, &args),
    }
}
