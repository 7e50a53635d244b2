//! Core domain types for Stylist.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the runtime: the package
//! primitives, the worker registry, and the protocol layer that consumes it.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod error;
mod package_manager;
mod request;
mod worker;

pub use error::WorkerError;
pub use package_manager::{PackageManager, UnknownPackageManager};
pub use request::{
    LintOptions, LintOutcome, ResolvedLinter, RunnerOptions, WorkspaceLintRequest,
    WorkspaceLintResult, WorkspaceResolveRequest, WorkspaceResolveResult,
};
pub use worker::{EnvironmentKey, PnpConfiguration, WorkerContext};
