//! Worker process runtime for Stylist.
//!
//! Linting runs in Node worker processes, one per working root, kept warm
//! across requests. [`WorkspaceOrchestrator`] is the surface the protocol
//! layer uses: it works out which root governs a file and hands the call to
//! [`WorkerRegistry`], which creates, replaces, and throttles workers.

mod cache;
mod codec;
mod environment;
mod error;
mod factory;
mod health;
mod orchestrator;
mod package_root_cache;
mod pnp_cache;
mod protocol;
mod registry;
mod stdio_worker;
mod worker;

pub use environment::WorkerEnvironmentKey;
pub use error::RuntimeError;
pub use factory::{CreateFut, StdioWorkerFactory, WorkerFactory};
pub use health::WorkerHealth;
pub use orchestrator::WorkspaceOrchestrator;
pub use package_root_cache::PackageRootCache;
pub use pnp_cache::PnpConfigurationCache;
pub use registry::WorkerRegistry;
pub use worker::{DisposeFut, LintParams, ResolveParams, WorkerFut, WorkerProcess};
