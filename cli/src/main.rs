//! Stylist CLI - one-shot access to the worker runtime.
//!
//! Each invocation builds a [`WorkspaceOrchestrator`], runs a single lint or
//! resolve through it, prints the result as JSON, and disposes every worker
//! before exiting. Logs go to stderr so stdout stays machine-readable.

mod cli;

use std::env;
use std::io;
use std::path::{self, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use stylist_config::RuntimeConfig;
use stylist_packages::GlobalPathResolver;
use stylist_runtime::WorkspaceOrchestrator;
use stylist_types::{LintOptions, RunnerOptions, WorkspaceLintRequest, WorkspaceResolveRequest};
use tokio::fs;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::{Cli, Commands, TargetArgs};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

fn load_config(cli: &Cli) -> RuntimeConfig {
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::load_from(path),
        None => RuntimeConfig::load(),
    };
    if let Some(script) = &cli.worker_script {
        config.worker_script = Some(script.clone());
    }
    config
}

fn absolute(relative: &Path) -> Result<PathBuf> {
    path::absolute(relative).with_context(|| format!("resolving {}", relative.display()))
}

fn workspace_folder(target: &TargetArgs) -> Result<PathBuf> {
    match &target.workspace {
        Some(folder) => absolute(folder),
        None => env::current_dir().context("reading current directory"),
    }
}

fn runner_options(target: &TargetArgs) -> Result<RunnerOptions> {
    Ok(RunnerOptions {
        stylelint_path: target.stylelint_path.as_deref().map(absolute).transpose()?,
        package_manager: target.package_manager,
        custom_syntax: target.custom_syntax.clone(),
        config_file: target.config_file.as_deref().map(absolute).transpose()?,
        ..RunnerOptions::default()
    })
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("rendering result")?;
    println!("{rendered}");
    Ok(())
}

async fn lint(
    orchestrator: &WorkspaceOrchestrator,
    file: &Path,
    fix: bool,
    target: &TargetArgs,
) -> Result<()> {
    let file = absolute(file)?;
    let code = fs::read_to_string(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let mut options = LintOptions::new(code, Some(file.clone()));
    options.fix = fix;
    let request = WorkspaceLintRequest {
        workspace_folder: workspace_folder(target)?,
        options,
        runner_options: runner_options(target)?,
    };

    match orchestrator.lint(request).await? {
        Some(outcome) => print_json(&outcome),
        None => {
            print_json(&Value::Null)?;
            tracing::info!("No stylelint installation found for {}", file.display());
            Ok(())
        }
    }
}

async fn resolve(
    orchestrator: &WorkspaceOrchestrator,
    file: Option<&Path>,
    target: &TargetArgs,
) -> Result<()> {
    let request = WorkspaceResolveRequest {
        workspace_folder: workspace_folder(target)?,
        stylelint_path: None,
        code_filename: file.map(absolute).transpose()?,
        runner_options: runner_options(target)?,
    };

    let resolved = orchestrator.resolve(request).await?;
    if resolved.is_none() {
        tracing::info!("No stylelint installation found");
    }
    print_json(&resolved)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(&cli);
    let global_paths = Arc::new(GlobalPathResolver::new());

    if let Commands::GlobalPath { manager } = &cli.command {
        let Some(path) = global_paths.resolve(*manager).await else {
            bail!("could not determine the global module directory for {manager}");
        };
        println!("{}", path.display());
        return Ok(());
    }

    let orchestrator =
        WorkspaceOrchestrator::with_stdio_workers(&config).with_global_paths(global_paths);
    let result = match &cli.command {
        Commands::Lint { file, fix, target } => lint(&orchestrator, file, *fix, target).await,
        Commands::Resolve { file, target } => resolve(&orchestrator, file.as_deref(), target).await,
        Commands::GlobalPath { .. } => Ok(()),
    };
    orchestrator.dispose_all().await;
    result
}
