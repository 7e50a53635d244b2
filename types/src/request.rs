//! Request and response records exchanged with the protocol layer.
//!
//! The same records travel, serialized as camelCase JSON, to the worker
//! process, so field names follow the linter's own option names.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::PackageManager;

/// User overrides that shape how the linter is located and invoked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerOptions {
    /// Explicit path to the linter package or entry point.
    pub stylelint_path: Option<PathBuf>,
    /// Package manager consulted for the global module directory.
    pub package_manager: Option<PackageManager>,
    /// Custom syntax module forwarded to the linter.
    pub custom_syntax: Option<String>,
    /// Inline linter configuration, overriding file-based lookup.
    pub config: Option<Value>,
    /// Explicit configuration file.
    pub config_file: Option<PathBuf>,
    /// Base directory for relative `extends`/`plugins` in inline configuration.
    pub config_basedir: Option<PathBuf>,
}

impl RunnerOptions {
    #[must_use]
    pub fn package_manager(&self) -> PackageManager {
        self.package_manager.unwrap_or_default()
    }
}

/// Options for a single lint invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LintOptions {
    /// Source text to lint.
    pub code: String,
    /// Path of the document being linted, if it exists on disk.
    pub code_filename: Option<PathBuf>,
    /// Whether the linter should compute fixes.
    pub fix: bool,
    pub ignore_disables: bool,
    pub report_needless_disables: bool,
    pub report_invalid_scope_disables: bool,
}

impl LintOptions {
    #[must_use]
    pub fn new(code: impl Into<String>, code_filename: Option<PathBuf>) -> Self {
        Self {
            code: code.into(),
            code_filename,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceLintRequest {
    pub workspace_folder: PathBuf,
    pub options: LintOptions,
    pub runner_options: RunnerOptions,
}

impl WorkspaceLintRequest {
    #[must_use]
    pub fn code_filename(&self) -> Option<&Path> {
        self.options.code_filename.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceResolveRequest {
    pub workspace_folder: PathBuf,
    pub stylelint_path: Option<PathBuf>,
    pub code_filename: Option<PathBuf>,
    pub runner_options: RunnerOptions,
}

impl WorkspaceResolveRequest {
    /// Explicit linter path, preferring the request field over runner options.
    #[must_use]
    pub fn stylelint_path(&self) -> Option<&Path> {
        self.stylelint_path
            .as_deref()
            .or(self.runner_options.stylelint_path.as_deref())
    }
}

/// Result of a lint run inside a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintOutcome {
    /// Linter entry point that produced the result.
    pub resolved_path: PathBuf,
    /// Raw linter result; converted to diagnostics by the protocol layer.
    pub linter_result: Value,
}

/// A linter installation located by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLinter {
    /// The module entry point (`.../stylelint/lib/index.cjs`).
    pub entry_path: PathBuf,
    /// The package directory the entry point belongs to.
    pub resolved_path: PathBuf,
    pub version: Option<String>,
}

/// Outcome of [`WorkspaceLintRequest`] as seen by the protocol layer.
pub type WorkspaceLintResult = LintOutcome;

/// Outcome of [`WorkspaceResolveRequest`] as seen by the protocol layer.
pub type WorkspaceResolveResult = ResolvedLinter;
