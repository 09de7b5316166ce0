//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Build orchestrator for split server/client component trees
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: splitbuild.toml)
    #[arg(short = 'C', long, global = true, default_value = "splitbuild.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build boundary proxies, client bundles and the import map
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Build, then rebuild whenever a module of the graph changes
    #[command(visible_alias = "w")]
    Watch {
        #[command(flatten)]
        build_args: BuildArgs,
    },

    /// Verify that a usable snapshot exists without building
    #[command(visible_alias = "c")]
    Check {
        /// Build profile to check
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Rewrite module references of a wire stream read from stdin
    #[command(visible_alias = "r")]
    Rewrite {
        /// Build profile whose snapshot provides the mapping
        #[arg(short, long)]
        profile: Option<String>,
    },
}

/// Shared build arguments for Build and Watch commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Minify client bundles
    #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub minify: Option<bool>,

    /// Runtime namespace imported by generated reference code
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Build profile (separate output and import-map entries per profile)
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Never invoke the bundler or write files; serve from the snapshot
    #[arg(short = 'R', long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
    pub read_only: Option<bool>,
}

impl Cli {
    pub const fn is_watch(&self) -> bool {
        matches!(self.command, Commands::Watch { .. })
    }

    /// Build arguments of the current command, if it takes any.
    pub const fn build_args(&self) -> Option<&BuildArgs> {
        match &self.command {
            Commands::Build { build_args } | Commands::Watch { build_args } => Some(build_args),
            Commands::Check { .. } | Commands::Rewrite { .. } => None,
        }
    }

    /// Profile override given on the command line.
    pub fn profile(&self) -> Option<&str> {
        match &self.command {
            Commands::Build { build_args } | Commands::Watch { build_args } => {
                build_args.profile.as_deref()
            }
            Commands::Check { profile } | Commands::Rewrite { profile } => profile.as_deref(),
        }
    }
}
