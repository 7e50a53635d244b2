//! The capability surface of a worker process.
//!
//! The registry only ever talks to workers through [`WorkerProcess`], so the
//! real stdio process and test substitutes are interchangeable.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde::Serialize;
use stylist_types::{LintOptions, LintOutcome, ResolvedLinter, RunnerOptions, WorkerError};

pub type WorkerFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, WorkerError>> + Send + 'a>>;

pub type DisposeFut<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LintParams {
    pub options: LintOptions,
    pub runner_options: RunnerOptions,
    /// Global module directory of the selected package manager, searched last.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_modules_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveParams {
    pub stylelint_path: Option<PathBuf>,
    pub code_filename: Option<PathBuf>,
    pub runner_options: RunnerOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_modules_path: Option<PathBuf>,
}

/// An isolated process running the linter for one working root.
///
/// `Ok(None)` from `lint` or `resolve` means no linter installation applies.
/// A worker that died mid-request reports [`WorkerError::Crashed`].
pub trait WorkerProcess: Send + Sync {
    fn lint(&self, params: LintParams) -> WorkerFut<'_, Option<LintOutcome>>;

    fn resolve(&self, params: ResolveParams) -> WorkerFut<'_, Option<ResolvedLinter>>;

    /// Stop the process. Requests already in flight are allowed to finish first.
    fn dispose(&self) -> DisposeFut<'_>;

    /// True once the process exited, was disposed, or evicted itself for idleness.
    fn is_disposed(&self) -> bool;
}
