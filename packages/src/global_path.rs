//! Global module directory lookup per package manager.
//!
//! Each manager is asked once; a successful answer is cached for the life of
//! the resolver. Failures are never fatal: they are logged and resolve to `None`.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;
use stylist_types::PackageManager;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::process::{RunOptions, RunnerError, run_find_line, try_run_find_line};

/// The command that reports a manager's global directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ManagerCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    pub fn for_manager(manager: PackageManager) -> Self {
        let args: &[&str] = match manager {
            PackageManager::Npm => &["config", "get", "prefix"],
            PackageManager::Yarn => &["global", "dir", "--json"],
            PackageManager::Pnpm => &["root", "-g"],
        };
        Self::new(manager.executable(), args)
    }
}

#[derive(Debug, Error)]
enum YarnRecordError {
    #[error("malformed JSON record: {0}")]
    Malformed(String),
    #[error("log record has no data field")]
    MissingData,
}

pub struct GlobalPathResolver {
    commands: HashMap<PackageManager, ManagerCommand>,
    /// Held across a lookup so concurrent callers share one process spawn.
    cache: Mutex<HashMap<PackageManager, PathBuf>>,
}

impl GlobalPathResolver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the command used for `manager`.
    #[must_use]
    pub fn with_command(mut self, manager: PackageManager, command: ManagerCommand) -> Self {
        self.commands.insert(manager, command);
        self
    }

    /// The global `node_modules` directory of `manager`, if it can be determined.
    pub async fn resolve(&self, manager: PackageManager) -> Option<PathBuf> {
        let mut cache = self.cache.lock().await;
        if let Some(path) = cache.get(&manager) {
            return Some(path.clone());
        }

        match self.lookup(manager).await {
            Ok(Some(path)) => {
                tracing::debug!(%manager, path = %path.display(), "Resolved global module directory");
                cache.insert(manager, path.clone());
                Some(path)
            }
            Ok(None) => {
                tracing::warn!(%manager, "Package manager reported no global module directory");
                None
            }
            Err(e) => {
                tracing::warn!(%manager, "Failed to resolve global module directory: {e}");
                None
            }
        }
    }

    async fn lookup(&self, manager: PackageManager) -> Result<Option<PathBuf>, RunnerError> {
        let command = self
            .commands
            .get(&manager)
            .cloned()
            .unwrap_or_else(|| ManagerCommand::for_manager(manager));
        let options = RunOptions::default();
        let program = command.program.as_str();
        let args = command.args.as_slice();

        match manager {
            PackageManager::Yarn => {
                try_run_find_line(program, args, &options, parse_yarn_line).await
            }
            PackageManager::Npm => {
                let prefix = run_find_line(program, args, &options, parse_plain_line).await?;
                Ok(prefix.map(npm_global_modules))
            }
            PackageManager::Pnpm => run_find_line(program, args, &options, parse_plain_line).await,
        }
    }
}

impl Default for GlobalPathResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Yarn prints one JSON record per line; the directory is the `data` of the first `log` record.
fn parse_yarn_line(line: &str) -> Result<Option<PathBuf>, YarnRecordError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let record: Value =
        serde_json::from_str(trimmed).map_err(|e| YarnRecordError::Malformed(e.to_string()))?;
    if record.get("type").and_then(Value::as_str) != Some("log") {
        return Ok(None);
    }

    let data = record
        .get("data")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .ok_or(YarnRecordError::MissingData)?;
    Ok(Some(PathBuf::from(data).join("node_modules")))
}

fn parse_plain_line(line: &str) -> Option<PathBuf> {
    let trimmed = line.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

/// npm reports its prefix; modules live under `lib/` everywhere except Windows.
fn npm_global_modules(prefix: PathBuf) -> PathBuf {
    if cfg!(windows) {
        prefix.join("node_modules")
    } else {
        prefix.join("lib").join("node_modules")
    }
}
