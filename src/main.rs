//! splitbuild - build orchestrator for split server/client component trees.

use anyhow::Result;
use clap::{ColorChoice, Parser};
use splitbuild::cli::{self, Cli, Commands};
use splitbuild::config::ProjectConfig;
use splitbuild::logger;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    // stdout carries the rewritten stream
    if matches!(cli.command, Commands::Rewrite { .. }) {
        logger::log_to_stderr();
    }

    let config = ProjectConfig::load(&cli)?;

    match &cli.command {
        Commands::Build { .. } => cli::build::build(&config),
        Commands::Watch { .. } => cli::watch::watch(&config),
        Commands::Check { .. } => cli::build::check(&config),
        Commands::Rewrite { .. } => cli::rewrite::rewrite(&config),
    }
}
