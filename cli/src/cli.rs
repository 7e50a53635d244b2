//! CLI argument definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stylist_types::PackageManager;

/// Stylist - stylelint through warm per-project worker processes
#[derive(Parser)]
#[command(name = "stylist")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Runtime configuration file (default: ~/.stylist/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Worker entry script, overriding the configured one
    #[arg(long, global = true)]
    pub worker_script: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Lint a stylesheet and print the linter result as JSON
    Lint {
        /// Stylesheet to lint
        file: PathBuf,

        /// Apply automatic fixes and print the fixed code
        #[arg(long)]
        fix: bool,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Show which stylelint installation governs a file
    Resolve {
        /// File whose project decides the installation
        file: Option<PathBuf>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Print a package manager's global module directory
    GlobalPath {
        /// npm, yarn or pnpm
        manager: PackageManager,
    },
}

#[derive(Args)]
pub struct TargetArgs {
    /// Workspace folder (default: current directory)
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Explicit stylelint package or entry point
    #[arg(long)]
    pub stylelint_path: Option<PathBuf>,

    /// Package manager used for the global module fallback
    #[arg(long)]
    pub package_manager: Option<PackageManager>,

    /// Custom PostCSS syntax module
    #[arg(long)]
    pub custom_syntax: Option<String>,

    /// Stylelint configuration file
    #[arg(long)]
    pub config_file: Option<PathBuf>,
}
