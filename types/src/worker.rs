//! Worker addressing types.
//!
//! A [`WorkerContext`] is the tuple the registry uses to find or create the
//! worker process that governs a file. The working root picks the slot; the
//! environment key decides whether the process in that slot is still current.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Identifies which Plug'n'Play loader, if any, governs module resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PnpConfiguration {
    /// The `.pnp.cjs` (or legacy `.pnp.js`) register script.
    pub register_path: PathBuf,
    /// The ESM loader (`.pnp.loader.mjs`) next to the register script, if present.
    pub loader_path: Option<PathBuf>,
}

impl PnpConfiguration {
    #[must_use]
    pub fn new(register_path: PathBuf, loader_path: Option<PathBuf>) -> Self {
        Self {
            register_path,
            loader_path,
        }
    }
}

/// Fingerprint over the manifests that determine a worker's behaviour.
///
/// Opaque: two keys are only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentKey(String);

impl EnvironmentKey {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Addressing tuple used to find or create a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerContext {
    workspace_folder: PathBuf,
    worker_root: PathBuf,
    pnp: Option<PnpConfiguration>,
    environment_key: Option<EnvironmentKey>,
}

impl WorkerContext {
    #[must_use]
    pub fn new(workspace_folder: impl Into<PathBuf>, worker_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_folder: workspace_folder.into(),
            worker_root: worker_root.into(),
            pnp: None,
            environment_key: None,
        }
    }

    #[must_use]
    pub fn with_pnp(mut self, pnp: Option<PnpConfiguration>) -> Self {
        self.pnp = pnp;
        self
    }

    #[must_use]
    pub fn with_environment_key(mut self, key: Option<EnvironmentKey>) -> Self {
        self.environment_key = key;
        self
    }

    #[must_use]
    pub fn workspace_folder(&self) -> &Path {
        &self.workspace_folder
    }

    #[must_use]
    pub fn worker_root(&self) -> &Path {
        &self.worker_root
    }

    #[must_use]
    pub fn pnp(&self) -> Option<&PnpConfiguration> {
        self.pnp.as_ref()
    }

    #[must_use]
    pub fn environment_key(&self) -> Option<&EnvironmentKey> {
        self.environment_key.as_ref()
    }
}
